use std::sync::Arc;

use log::{debug, info};

use crate::calibration::{Calibrator, ZeroReason};
use crate::config::{Action, ConfigHandle, EngineConfig};
use crate::dispatch::fallback::FallbackChain;
use crate::dispatch::{ActionDispatcher, ActionSink, DispatchOutcome, InlineDispatch, NullMediaKeys};
use crate::feedback::{FeedbackEmitter, Haptics, NoHaptics};
use crate::guard::{NoiseFloor, StrongFieldGuard, Suppression};
use crate::notify::{Notifier, NullNotifier, StatusThrottle, StatusUpdate};
use crate::policy;
use crate::signal::{classify, ClassifiedSample, MagnitudeFilter, Sample};
use crate::trigger::{Gesture, SessionStatus, Step, TriggerStateMachine};

/// Sensor-to-action trigger engine.
///
/// Owns the single trigger session and processes one sample at a time, from
/// baseline correction through to dispatch, before returning. Configuration is
/// read from a [`ConfigHandle`] snapshot on every sample, so a reload applies
/// to the next sample without resetting a press in progress.
///
/// # Example
///
/// ```no_run
/// use magnet_controller::{EngineConfig, MagnetEngine, Sample};
///
/// let mut engine = MagnetEngine::builder(EngineConfig::default()).build();
/// engine.process(Sample::new(0.0, 0.0, 600.0, 0));
/// let report = engine.process(Sample::new(0.0, 0.0, 10.0, 300));
/// println!("{:?} -> {:?}", report.gesture, report.action);
/// ```
pub struct MagnetEngine {
    config: ConfigHandle,
    calibrator: Calibrator,
    filter: MagnitudeFilter,
    noise: NoiseFloor,
    guard: StrongFieldGuard,
    machine: TriggerStateMachine,
    feedback: FeedbackEmitter,
    sink: Box<dyn ActionSink>,
    notifier: Arc<dyn Notifier>,
    throttle: StatusThrottle,
    last_timestamp_ms: u64,
}

/// Everything that happened while processing one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Offset-corrected, smoothed classification fed to the state machine
    pub sample: ClassifiedSample,
    pub gesture: Option<Gesture>,
    pub action: Option<Action>,
    /// Present when the sink ran the action inline
    pub outcome: Option<DispatchOutcome>,
    pub status: SessionStatus,
    /// Set when the baseline moved on this sample
    pub zeroed: Option<ZeroReason>,
    /// The sample was treated as strong-field interference
    pub suppressed: bool,
}

pub struct EngineBuilder {
    config: ConfigHandle,
    haptics: Option<Box<dyn Haptics>>,
    sink: Option<Box<dyn ActionSink>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl EngineBuilder {
    /// Replace the configuration source with a shared handle.
    pub fn config_handle(mut self, handle: ConfigHandle) -> Self {
        self.config = handle;
        self
    }

    pub fn haptics(mut self, haptics: Box<dyn Haptics>) -> Self {
        self.haptics = Some(haptics);
        self
    }

    pub fn sink(mut self, sink: Box<dyn ActionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Without a sink, actions go to a dry-run dispatcher with no voice
    /// strategies.
    pub fn build(self) -> MagnetEngine {
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(NullNotifier));
        let sink = self.sink.unwrap_or_else(|| {
            let dispatcher =
                ActionDispatcher::new(Box::new(NullMediaKeys), FallbackChain::new(Vec::new()));
            Box::new(InlineDispatch::new(dispatcher, notifier.clone()))
        });
        let snapshot = self.config.snapshot();

        MagnetEngine {
            calibrator: Calibrator::new(snapshot.zero_on_start),
            filter: MagnitudeFilter::new(snapshot.smoothing_window),
            noise: NoiseFloor::new(),
            guard: StrongFieldGuard::new(),
            machine: TriggerStateMachine::new(),
            feedback: FeedbackEmitter::new(self.haptics.unwrap_or_else(|| Box::new(NoHaptics))),
            throttle: StatusThrottle::new(),
            last_timestamp_ms: 0,
            config: self.config,
            sink,
            notifier,
        }
    }
}

impl MagnetEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        Self::with_config_handle(ConfigHandle::new(config))
    }

    /// Builder reading from an existing handle, so reloads can come from
    /// elsewhere.
    pub fn with_config_handle(handle: ConfigHandle) -> EngineBuilder {
        EngineBuilder {
            config: handle,
            haptics: None,
            sink: None,
            notifier: None,
        }
    }

    pub fn config_handle(&self) -> ConfigHandle {
        self.config.clone()
    }

    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.snapshot()
    }

    /// Swap the configuration. A live session keeps running under the new
    /// thresholds and deadline.
    pub fn reload(&self, config: EngineConfig) -> Arc<EngineConfig> {
        let previous = self.config.replace(config);
        info!("configuration reloaded");
        previous
    }

    pub fn offset(&self) -> [f32; 3] {
        self.calibrator.offset()
    }

    /// Session state as of the last processed sample.
    pub fn status(&self) -> SessionStatus {
        self.machine.status(self.last_timestamp_ms)
    }

    /// Run one raw sample through the whole pipeline.
    pub fn process(&mut self, raw: Sample) -> StepReport {
        let config = self.config.snapshot();
        self.last_timestamp_ms = raw.timestamp_ms;

        let (corrected, mut zeroed) = self.calibrator.correct(&raw);
        if let Some(reason) = zeroed {
            self.baseline_moved(reason);
        }

        let mut classified = classify(&corrected);
        self.filter.resize(config.smoothing_window);
        classified.magnitude = self.filter.push(classified.magnitude);

        let now = classified.timestamp_ms;
        if self.machine.is_idle() {
            self.noise.observe(classified.magnitude, config.threshold_reset);
            if let Some(reason) = self.calibrator.observe(classified.magnitude, now, &config.auto_zero) {
                self.baseline_moved(reason);
                zeroed = Some(reason);
            }
        } else {
            self.calibrator.hold();
        }

        let suppression = self.guard.check(classified.magnitude, now, &config.strong_field);
        let step = match suppression {
            Suppression::Pass => {
                let thresholds = self.noise.thresholds(&config);
                self.machine.step_within(&classified, &config, thresholds)
            }
            Suppression::Started => {
                self.machine.suppress(now);
                self.feedback.stop();
                self.notifier.log("strong steady field, press ignored");
                Step::default()
            }
            Suppression::Ongoing => Step::default(),
        };
        if let Some(cue) = step.cue {
            self.feedback.apply(cue);
        }

        let mut action = None;
        let mut outcome = None;
        if let Some(gesture) = step.gesture {
            let resolved = policy::resolve(&gesture, &config);
            info!("{} -> {}", gesture, resolved);
            self.notifier.log(&format!("{} -> {}", gesture, resolved));
            action = Some(resolved);
            outcome = self.sink.submit(resolved);
        }

        let status = self.machine.status(classified.timestamp_ms);
        if self.throttle.ready(classified.timestamp_ms, config.status_interval) {
            self.notifier.status(&StatusUpdate {
                timestamp_ms: classified.timestamp_ms,
                axes: corrected.axes(),
                magnitude: classified.magnitude,
                polarity: classified.polarity,
                session: status,
            });
        }

        StepReport {
            sample: classified,
            gesture: step.gesture,
            action,
            outcome,
            status,
            zeroed,
            suppressed: suppression != Suppression::Pass,
        }
    }

    /// Take the latest raw reading as the new zero.
    ///
    /// A press in progress is dropped without a gesture.
    pub fn zero_baseline(&mut self) -> [f32; 3] {
        if self.machine.abandon().is_some() {
            self.notifier.log("press cancelled by zeroing");
        }
        self.feedback.stop();
        let offset = self.calibrator.zero(ZeroReason::Manual);
        self.filter.clear();
        self.guard.clear();
        self.notifier.log(&format!(
            "baseline zeroed: x={:.0} y={:.0} z={:.0}",
            offset[0], offset[1], offset[2]
        ));
        offset
    }

    /// Run the voice assistant action outside of any press.
    pub fn trigger_voice(&mut self) -> Option<DispatchOutcome> {
        info!("voice assistant requested manually");
        self.notifier.log("voice assistant requested");
        self.sink.submit(Action::VoiceAssist)
    }

    fn baseline_moved(&mut self, reason: ZeroReason) {
        let offset = self.calibrator.offset();
        debug!("engine: baseline moved ({})", reason);
        self.filter.clear();
        self.guard.clear();
        self.notifier.log(&format!(
            "baseline zeroed ({}): x={:.0} y={:.0} z={:.0}",
            reason, offset[0], offset[1], offset[2]
        ));
    }
}

impl std::fmt::Debug for MagnetEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MagnetEngine")
            .field("machine", &self.machine)
            .field("feedback", &self.feedback)
            .field("offset", &self.calibrator.offset())
            .finish_non_exhaustive()
    }
}
