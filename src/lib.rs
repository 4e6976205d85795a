//! # magnet-controller
//!
//! **Turn a magnet into a button.**
//!
//! A background controller that watches a 3-axis magnetometer stream and turns
//! "magnet brought close, then taken away" into discrete press gestures, which
//! are then mapped to device actions (media keys, voice assistant).
//!
//! ## Quick Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use magnet_controller::{
//!     ActionDispatcher, EngineConfig, FallbackChain, InlineDispatch, MagnetEngine,
//!     NoHaptics, NullMediaKeys, NullNotifier, Sample,
//! };
//!
//! let notifier = Arc::new(NullNotifier);
//! let dispatcher = ActionDispatcher::new(Box::new(NullMediaKeys), FallbackChain::new(Vec::new()));
//! let mut engine = MagnetEngine::builder(EngineConfig::default())
//!     .haptics(Box::new(NoHaptics))
//!     .sink(Box::new(InlineDispatch::new(dispatcher, notifier.clone())))
//!     .notifier(notifier)
//!     .build();
//!
//! let report = engine.process(Sample::new(0.0, 0.0, 600.0, 0));
//! assert!(report.gesture.is_none());
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! SampleSource -> calibration -> signal::classify -> TriggerStateMachine
//!     -> (FeedbackEmitter) -> policy::resolve -> ActionDispatcher -> FallbackChain -> Notifier
//! ```
//!
//! - **Hysteresis** - two thresholds (trigger / reset) with a dead zone in between
//! - **Short / long press** - long press fires while the magnet is still held
//! - **Poles** - north and south can be gated or mapped to different actions
//! - **Fallback chain** - voice assistant strategies are tried in order until one works
//! - **Hot reload** - configuration snapshots are swapped atomically

pub mod calibration;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod feedback;
pub mod guard;
pub mod notify;
pub mod policy;
pub mod settings;
pub mod signal;
pub mod source;
pub mod trigger;

pub use calibration::{AutoZeroConfig, Calibrator};
pub use config::{Action, ActionMap, ConfigHandle, EngineConfig, PoleMode};
pub use dispatch::fallback::{AssistStrategy, AttemptRecord, FallbackChain, StrategyError};
pub use dispatch::worker::DispatchWorker;
pub use dispatch::{
    ActionDispatcher, ActionSink, DispatchOutcome, InlineDispatch, MediaKey, MediaKeys,
    NullMediaKeys,
};
pub use engine::{EngineBuilder, MagnetEngine, StepReport};
pub use feedback::{FeedbackEmitter, Haptics, NoHaptics};
pub use guard::{StrongFieldConfig, Thresholds};
pub use notify::{LogHistory, Notifier, NullNotifier, StatusUpdate};
pub use settings::{JsonSettingsFile, Settings, SettingsStore, StrategySpec};
pub use signal::{classify, ClassifiedSample, Polarity, Sample, POLE_THRESHOLD_UT};
pub use source::{LineSource, ReplaySource, SampleSource};
pub use trigger::{ControlCommand, Gesture, GestureKind, SessionStatus, TriggerStateMachine};

/// Errors surfaced by the library.
///
/// Nothing in the sample path is fatal: configuration problems are clamped and
/// action failures are reported to the [`Notifier`]. These variants are what
/// the boundaries (settings store, sample sources, capabilities) hand back.
#[derive(Debug)]
pub enum Error {
    /// Configuration value could not be used as given
    Config(String),
    /// Settings store could not be read or written
    Settings(String),
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Sample source produced something that is not a sample
    Source(String),
    /// A host capability (media keys, haptics, ...) refused the request
    Capability(String),
    /// Every voice-assistant strategy failed
    ChainExhausted(Vec<AttemptRecord>),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Settings(msg) => write!(f, "settings error: {}", msg),
            Error::Io(e) => write!(f, "i/o error: {}", e),
            Error::Json(e) => write!(f, "json error: {}", e),
            Error::Source(msg) => write!(f, "sample source error: {}", msg),
            Error::Capability(msg) => write!(f, "capability error: {}", msg),
            Error::ChainExhausted(attempts) => {
                write!(f, "all {} voice assistant strategies failed", attempts.len())?;
                for attempt in attempts {
                    write!(f, "; {}", attempt)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
