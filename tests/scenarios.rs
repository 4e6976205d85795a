//! End-to-end behaviour of the trigger engine through the public API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use magnet_controller::{
    policy, Action, ActionDispatcher, ActionMap, ActionSink, AssistStrategy, AttemptRecord,
    DispatchOutcome, EngineConfig, Error, FallbackChain, Gesture, GestureKind, Haptics,
    InlineDispatch, MagnetEngine, MediaKey, MediaKeys, Notifier, PoleMode, Polarity,
    ReplaySource, Sample, SampleSource, SessionStatus, StrategyError,
};

type Journal = Arc<Mutex<Vec<String>>>;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

struct Motor(Journal);

impl Haptics for Motor {
    fn is_available(&self) -> bool {
        true
    }

    fn vibrate_continuous(&mut self) -> magnet_controller::Result<()> {
        self.0.lock().unwrap().push("buzz".into());
        Ok(())
    }

    fn vibrate_pattern(&mut self, _pattern: &[Duration]) -> magnet_controller::Result<()> {
        self.0.lock().unwrap().push("double_pulse".into());
        Ok(())
    }

    fn cancel(&mut self) -> magnet_controller::Result<()> {
        self.0.lock().unwrap().push("stop".into());
        Ok(())
    }
}

struct Sink(Arc<Mutex<Vec<Action>>>);

impl ActionSink for Sink {
    fn submit(&mut self, action: Action) -> Option<DispatchOutcome> {
        self.0.lock().unwrap().push(action);
        None
    }
}

struct Rig {
    engine: MagnetEngine,
    actions: Arc<Mutex<Vec<Action>>>,
    motor: Journal,
}

fn rig(config: EngineConfig) -> Rig {
    let actions = Arc::new(Mutex::new(Vec::new()));
    let motor = journal();
    let engine = MagnetEngine::builder(config)
        .haptics(Box::new(Motor(motor.clone())))
        .sink(Box::new(Sink(actions.clone())))
        .build();
    Rig {
        engine,
        actions,
        motor,
    }
}

fn reference_config() -> EngineConfig {
    EngineConfig::with_thresholds(500.0, 300.0, Duration::from_millis(1500))
}

fn north(magnitude: f32, t: u64) -> Sample {
    Sample::new(0.0, 0.0, magnitude, t)
}

fn south(magnitude: f32, t: u64) -> Sample {
    Sample::new(0.0, 0.0, -magnitude, t)
}

/// Small deterministic generator for sample sequences.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

#[test]
fn long_press_then_release() {
    let mut rig = rig(reference_config());

    let armed = rig.engine.process(north(600.0, 0));
    assert!(armed.gesture.is_none());
    assert!(matches!(armed.status, SessionStatus::Armed { .. }));
    assert_eq!(entries(&rig.motor), vec!["buzz"]);

    let fired = rig.engine.process(north(600.0, 1600));
    assert_eq!(fired.gesture, Some(Gesture::long(Polarity::North)));
    assert_eq!(fired.status, SessionStatus::Fired);
    assert_eq!(entries(&rig.motor), vec!["buzz", "stop", "double_pulse"]);

    let released = rig.engine.process(north(250.0, 2000));
    assert!(released.gesture.is_none());
    assert_eq!(released.status, SessionStatus::Idle);

    assert_eq!(*rig.actions.lock().unwrap(), vec![Action::VoiceAssist]);
}

#[test]
fn short_press_on_south_pole() {
    let mut rig = rig(reference_config());
    let mut source = ReplaySource::new(vec![south(600.0, 0), south(250.0, 500)]);

    let mut gestures = Vec::new();
    while let Some(sample) = source.next_sample().unwrap() {
        gestures.extend(rig.engine.process(sample).gesture);
    }

    assert_eq!(gestures, vec![Gesture::short(Polarity::South)]);
    assert_eq!(*rig.actions.lock().unwrap(), vec![Action::MediaToggle]);
    assert_eq!(entries(&rig.motor), vec!["buzz", "stop"]);
}

#[test]
fn reload_shortens_live_deadline() {
    let mut rig = rig(reference_config());
    rig.engine.process(north(600.0, 100));

    rig.engine.reload(EngineConfig {
        long_press: Duration::from_millis(200),
        ..reference_config()
    });

    assert!(rig.engine.process(north(600.0, 250)).gesture.is_none());
    assert!(rig.engine.process(north(600.0, 300)).gesture.is_none());
    assert_eq!(
        rig.engine.process(north(600.0, 350)).gesture,
        Some(Gesture::long(Polarity::North))
    );
}

#[test]
fn reload_lengthens_live_deadline() {
    let mut rig = rig(reference_config());
    rig.engine.process(north(600.0, 0));
    rig.engine.reload(EngineConfig {
        long_press: Duration::from_millis(3000),
        ..reference_config()
    });
    assert!(rig.engine.process(north(600.0, 1600)).gesture.is_none());
    assert_eq!(
        rig.engine.process(north(600.0, 3001)).gesture,
        Some(Gesture::long(Polarity::North))
    );
}

#[test]
fn one_gesture_per_session_over_random_streams() {
    for seed in 1..=20u64 {
        let mut rng = Lcg(seed);
        let mut rig = rig(reference_config());
        let mut t = 0u64;
        let mut in_session = false;
        let mut count = 0;
        let mut last_gesture = None;

        for _ in 0..2000 {
            t += 5 + rng.next(200);
            let magnitude = rng.next(900) as f32;
            let sample = if rng.next(2) == 0 {
                north(magnitude, t)
            } else {
                south(magnitude, t)
            };

            let report = rig.engine.process(sample);
            let active = report.status != SessionStatus::Idle;
            if !in_session && active {
                assert!(report.gesture.is_none(), "arming never emits a gesture");
                in_session = true;
                count = 0;
            }
            if let Some(gesture) = report.gesture {
                assert!(in_session, "gesture outside a session (seed {})", seed);
                match gesture.kind {
                    GestureKind::LongPress => assert_eq!(report.status, SessionStatus::Fired),
                    GestureKind::ShortPress => assert!(!active),
                }
                count += 1;
                last_gesture = Some(gesture);
            }
            if in_session && !active {
                assert_eq!(count, 1, "seed {} at t={}", seed, t);
                in_session = false;
            }
        }

        if in_session {
            assert!(count <= 1);
            if count == 1 {
                assert_eq!(last_gesture.map(|g| g.kind), Some(GestureKind::LongPress));
            }
        }
        let sessions = rig.actions.lock().unwrap().len();
        assert!(sessions > 0, "seed {} produced no presses", seed);
    }
}

#[test]
fn long_press_timing_is_independent_of_sample_rate() {
    for step in [7u64, 33, 100, 250] {
        let mut rig = rig(reference_config());
        let mut fired_at = None;
        let mut t = 0;
        while t <= 4000 {
            if rig.engine.process(north(700.0, t)).gesture.is_some() {
                fired_at = Some(t);
                break;
            }
            t += step;
        }
        let fired_at = fired_at.unwrap();
        assert!(fired_at > 1500, "step {} fired early at {}", step, fired_at);
        assert!(fired_at - step <= 1500, "step {} fired late at {}", step, fired_at);
    }
}

#[test]
fn dead_zone_is_inert_while_idle() {
    let mut rig = rig(reference_config());
    let mut rng = Lcg(7);
    for i in 0..500u64 {
        let magnitude = 301.0 + rng.next(199) as f32;
        let report = rig.engine.process(north(magnitude, i * 20));
        assert!(report.gesture.is_none());
        assert_eq!(report.status, SessionStatus::Idle);
    }
    assert!(rig.actions.lock().unwrap().is_empty());
    assert!(entries(&rig.motor).is_empty());
}

#[test]
fn pole_gating_and_differentiated_actions() {
    let mut rig = rig(EngineConfig {
        pole_mode: PoleMode::SouthOnly,
        actions: ActionMap {
            n_short: Action::MediaNext,
            n_long: Action::VolumeUp,
            s_short: Action::MediaPrevious,
            s_long: Action::VolumeDown,
        },
        ..reference_config()
    });

    rig.engine.process(north(900.0, 0));
    rig.engine.process(north(0.0, 100));
    rig.engine.process(south(900.0, 200));
    rig.engine.process(south(0.0, 300));

    assert_eq!(*rig.actions.lock().unwrap(), vec![Action::MediaPrevious]);
}

#[test]
fn inverted_configuration_is_clamped_and_keeps_running() {
    let mut rig = rig(EngineConfig::with_thresholds(400.0, 450.0, Duration::from_millis(1500)));
    let config = rig.engine.config();
    assert!(config.threshold_reset < config.threshold_trigger);

    rig.engine.process(north(500.0, 0));
    let report = rig.engine.process(north(100.0, 200));
    assert_eq!(report.gesture, Some(Gesture::short(Polarity::North)));
}

#[test]
fn resolve_is_referentially_transparent() {
    let configs = [
        reference_config(),
        EngineConfig {
            pole_mode: PoleMode::Differentiated,
            actions: ActionMap {
                n_short: Action::VoiceAssist,
                n_long: Action::MediaToggle,
                s_short: Action::MediaToggle,
                s_long: Action::VoiceAssist,
            },
            ..reference_config()
        },
    ];
    for config in &configs {
        for polarity in [Polarity::North, Polarity::South, Polarity::None] {
            for gesture in [Gesture::short(polarity), Gesture::long(polarity)] {
                let first = policy::resolve(&gesture, config);
                let second = policy::resolve(&gesture, &config.clone());
                assert_eq!(first, second);
            }
        }
    }
}

struct Scripted {
    name: &'static str,
    ok: bool,
    journal: Journal,
}

impl AssistStrategy for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn attempt(&mut self) -> Result<(), StrategyError> {
        self.journal.lock().unwrap().push(format!("attempt:{}", self.name));
        if self.ok {
            Ok(())
        } else {
            Err(StrategyError::Unavailable(format!("{} missing", self.name)))
        }
    }
}

struct JournalNotifier(Journal);

impl Notifier for JournalNotifier {
    fn attempt(&self, record: &AttemptRecord) {
        self.0.lock().unwrap().push(format!("notify:{}", record.strategy));
    }

    fn exhausted(&self, records: &[AttemptRecord]) {
        self.0.lock().unwrap().push(format!("exhausted:{}", records.len()));
    }
}

struct QuietKeys;

impl MediaKeys for QuietKeys {
    fn send(&mut self, _key: MediaKey) -> magnet_controller::Result<()> {
        Ok(())
    }
}

fn voice_engine(script: &[(&'static str, bool)], journal: &Journal) -> MagnetEngine {
    let strategies = script
        .iter()
        .map(|&(name, ok)| {
            Box::new(Scripted {
                name,
                ok,
                journal: journal.clone(),
            }) as Box<dyn AssistStrategy>
        })
        .collect();
    let notifier = Arc::new(JournalNotifier(journal.clone()));
    let dispatcher = ActionDispatcher::new(Box::new(QuietKeys), FallbackChain::new(strategies));
    MagnetEngine::builder(reference_config())
        .sink(Box::new(InlineDispatch::new(dispatcher, notifier.clone())))
        .notifier(notifier)
        .build()
}

#[test]
fn fallback_stops_at_first_success_and_reports_incrementally() {
    let journal = journal();
    let mut engine = voice_engine(&[("a", false), ("b", true), ("c", false)], &journal);

    engine.process(north(600.0, 0));
    let report = engine.process(north(600.0, 1600));
    let outcome = report.outcome.unwrap();

    assert_eq!(outcome.action, Action::VoiceAssist);
    assert!(outcome.succeeded);
    assert_eq!(
        outcome.attempts,
        vec![
            AttemptRecord::failure("a", StrategyError::Unavailable("a missing".into())),
            AttemptRecord::success("b"),
        ]
    );
    assert_eq!(
        entries(&journal),
        vec!["attempt:a", "notify:a", "attempt:b", "notify:b"]
    );
}

#[test]
fn fallback_exhaustion_lists_every_strategy() {
    let journal = journal();
    let mut engine = voice_engine(&[("a", false), ("b", false), ("c", false)], &journal);

    let outcome = engine.trigger_voice().unwrap();
    assert!(!outcome.succeeded);
    let names: Vec<_> = outcome.attempts.iter().map(|r| r.strategy.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(entries(&journal).last().map(String::as_str), Some("exhausted:3"));

    // the next gesture is the next chance; nothing was retried in between
    let attempts = entries(&journal)
        .iter()
        .filter(|e| e.starts_with("attempt:"))
        .count();
    assert_eq!(attempts, 3);
}

#[test]
fn chain_exhaustion_error_carries_the_log() {
    let journal = journal();
    let mut chain = FallbackChain::new(vec![Box::new(Scripted {
        name: "only",
        ok: false,
        journal: journal.clone(),
    })]);
    match chain.run(&JournalNotifier(journal)) {
        Err(Error::ChainExhausted(log)) => assert_eq!(log.len(), 1),
        other => panic!("unexpected {:?}", other),
    }
}
