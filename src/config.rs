//! Engine configuration and its hot-reloadable snapshot.
//!
//! [`EngineConfig`] is the typed, validated form of what the settings store
//! holds. The engine never reads a half-written configuration: a
//! [`ConfigHandle`] hands out `Arc` snapshots and reloads swap the whole
//! value.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::warn;
use serde::Serialize;

use crate::calibration::AutoZeroConfig;
use crate::guard::StrongFieldConfig;
use crate::signal::Polarity;

/// Gap kept between the reset and trigger thresholds when a configuration
/// has them inverted.
pub const RESET_EPSILON_UT: f32 = 1.0;

pub const DEFAULT_THRESHOLD_TRIGGER: f32 = 500.0;
pub const DEFAULT_THRESHOLD_RESET: f32 = 300.0;
pub const DEFAULT_LONG_PRESS: Duration = Duration::from_millis(1500);
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_millis(100);

/// Which poles may start a press, and whether they are told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoleMode {
    /// Either pole arms; actions are configured the same for both
    #[default]
    Both,
    NorthOnly,
    SouthOnly,
    /// Either pole arms; north and south map to their own actions
    Differentiated,
}

impl PoleMode {
    /// Settings-store name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            PoleMode::Both => "both",
            PoleMode::NorthOnly => "north",
            PoleMode::SouthOnly => "south",
            PoleMode::Differentiated => "different",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "both" | "all" => Some(PoleMode::Both),
            "north" | "n" | "n_only" | "north_only" => Some(PoleMode::NorthOnly),
            "south" | "s" | "s_only" | "south_only" => Some(PoleMode::SouthOnly),
            "different" | "differentiated" => Some(PoleMode::Differentiated),
            _ => None,
        }
    }

    /// Whether a sample of `polarity` may arm a new session.
    pub fn admits(&self, polarity: Polarity) -> bool {
        match self {
            PoleMode::Both | PoleMode::Differentiated => true,
            PoleMode::NorthOnly => polarity == Polarity::North,
            PoleMode::SouthOnly => polarity == Polarity::South,
        }
    }
}

/// What a gesture does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    MediaToggle,
    MediaNext,
    MediaPrevious,
    VolumeUp,
    VolumeDown,
    VoiceAssist,
}

impl Action {
    /// Settings-store name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::MediaToggle => "play_pause",
            Action::MediaNext => "next",
            Action::MediaPrevious => "previous",
            Action::VolumeUp => "volume_up",
            Action::VolumeDown => "volume_down",
            Action::VoiceAssist => "voice",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            // "media" is what older settings files call play/pause
            "play_pause" | "media" => Some(Action::MediaToggle),
            "next" => Some(Action::MediaNext),
            "previous" => Some(Action::MediaPrevious),
            "volume_up" => Some(Action::VolumeUp),
            "volume_down" => Some(Action::VolumeDown),
            "voice" => Some(Action::VoiceAssist),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action per (pole, press length).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionMap {
    pub n_short: Action,
    pub n_long: Action,
    pub s_short: Action,
    pub s_long: Action,
}

impl ActionMap {
    /// Same action for both poles.
    pub fn symmetric(short: Action, long: Action) -> Self {
        Self {
            n_short: short,
            n_long: long,
            s_short: short,
            s_long: long,
        }
    }
}

impl Default for ActionMap {
    fn default() -> Self {
        Self::symmetric(Action::MediaToggle, Action::VoiceAssist)
    }
}

/// Everything the trigger engine reads per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Magnitude (µT) above which a session starts
    pub threshold_trigger: f32,
    /// Magnitude (µT) at or below which a session ends
    pub threshold_reset: f32,
    /// Hold time after which the press counts as long
    pub long_press: Duration,
    pub pole_mode: PoleMode,
    pub actions: ActionMap,
    /// Moving-average length over magnitudes, 1 disables smoothing
    pub smoothing_window: usize,
    /// Minimum quiet time after a gesture before the next session may arm
    pub rearm_cooldown: Duration,
    pub auto_zero: AutoZeroConfig,
    /// Lift the thresholds to `noise mean + noise_sigma·σ` of the quiet
    /// field; 0 keeps them fixed
    pub noise_sigma: f32,
    /// Cancel presses caused by a strong, steady field
    pub strong_field: StrongFieldConfig,
    /// Take the first sample after start-up as the zero baseline
    pub zero_on_start: bool,
    /// Minimum spacing of status pushes to the notifier
    pub status_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold_trigger: DEFAULT_THRESHOLD_TRIGGER,
            threshold_reset: DEFAULT_THRESHOLD_RESET,
            long_press: DEFAULT_LONG_PRESS,
            pole_mode: PoleMode::Both,
            actions: ActionMap::default(),
            smoothing_window: 1,
            rearm_cooldown: Duration::ZERO,
            auto_zero: AutoZeroConfig::disabled(),
            noise_sigma: 0.0,
            strong_field: StrongFieldConfig::disabled(),
            zero_on_start: false,
            status_interval: DEFAULT_STATUS_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Shorthand for the three values most callers care about.
    pub fn with_thresholds(trigger: f32, reset: f32, long_press: Duration) -> Self {
        Self {
            threshold_trigger: trigger,
            threshold_reset: reset,
            long_press,
            ..Self::default()
        }
    }

    /// Repair values the engine cannot run with.
    ///
    /// Never fails: every bad value is replaced and reported with `warn!`.
    pub fn sanitized(mut self) -> Self {
        if !self.threshold_trigger.is_finite() || self.threshold_trigger <= 0.0 {
            warn!(
                "threshold_trigger {} is unusable, using {}",
                self.threshold_trigger, DEFAULT_THRESHOLD_TRIGGER
            );
            self.threshold_trigger = DEFAULT_THRESHOLD_TRIGGER;
        }
        if !self.threshold_reset.is_finite() || self.threshold_reset < 0.0 {
            warn!(
                "threshold_reset {} is unusable, using {}",
                self.threshold_reset, DEFAULT_THRESHOLD_RESET
            );
            self.threshold_reset = DEFAULT_THRESHOLD_RESET;
        }
        if self.threshold_reset >= self.threshold_trigger {
            let clamped = (self.threshold_trigger - RESET_EPSILON_UT).max(0.0);
            warn!(
                "threshold_reset {} must stay below threshold_trigger {}, clamping to {}",
                self.threshold_reset, self.threshold_trigger, clamped
            );
            self.threshold_reset = clamped;
        }
        if self.smoothing_window == 0 {
            self.smoothing_window = 1;
        }
        if !self.noise_sigma.is_finite() || self.noise_sigma < 0.0 {
            warn!("noise_sigma {} is unusable, disabling the noise floor", self.noise_sigma);
            self.noise_sigma = 0.0;
        }
        self.auto_zero = self.auto_zero.sanitized();
        self.strong_field = self.strong_field.sanitized();
        self
    }
}

/// Shared, atomically replaceable configuration snapshot.
///
/// Cloning the handle shares the same slot; a reload through any clone is
/// seen by every reader on its next [`snapshot`](Self::snapshot).
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    slot: Arc<RwLock<Arc<EngineConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Arc::new(config.sanitized()))),
        }
    }

    pub fn snapshot(&self) -> Arc<EngineConfig> {
        let guard = self.slot.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new configuration. Returns the previous snapshot.
    pub fn replace(&self, config: EngineConfig) -> Arc<EngineConfig> {
        let next = Arc::new(config.sanitized());
        let mut guard = self.slot.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, next)
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_already_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.clone().sanitized(), config);
    }

    #[test]
    fn inverted_thresholds_are_clamped_below_trigger() {
        let config = EngineConfig::with_thresholds(400.0, 450.0, DEFAULT_LONG_PRESS).sanitized();
        assert_eq!(config.threshold_trigger, 400.0);
        assert_eq!(config.threshold_reset, 400.0 - RESET_EPSILON_UT);
    }

    #[test]
    fn equal_thresholds_are_clamped_too() {
        let config = EngineConfig::with_thresholds(300.0, 300.0, DEFAULT_LONG_PRESS).sanitized();
        assert!(config.threshold_reset < config.threshold_trigger);
    }

    #[test]
    fn non_finite_values_fall_back_to_defaults() {
        let config = EngineConfig::with_thresholds(f32::NAN, f32::INFINITY, DEFAULT_LONG_PRESS)
            .sanitized();
        assert_eq!(config.threshold_trigger, DEFAULT_THRESHOLD_TRIGGER);
        assert_eq!(config.threshold_reset, DEFAULT_THRESHOLD_RESET);
    }

    #[test]
    fn pole_gating() {
        assert!(PoleMode::Both.admits(Polarity::None));
        assert!(PoleMode::Differentiated.admits(Polarity::South));
        assert!(PoleMode::NorthOnly.admits(Polarity::North));
        assert!(!PoleMode::NorthOnly.admits(Polarity::South));
        assert!(!PoleMode::NorthOnly.admits(Polarity::None));
        assert!(PoleMode::SouthOnly.admits(Polarity::South));
        assert!(!PoleMode::SouthOnly.admits(Polarity::North));
    }

    #[test]
    fn names_round_trip_through_the_store_spelling() {
        for action in [
            Action::MediaToggle,
            Action::MediaNext,
            Action::MediaPrevious,
            Action::VolumeUp,
            Action::VolumeDown,
            Action::VoiceAssist,
        ] {
            assert_eq!(Action::from_name(action.as_str()), Some(action));
        }
        assert_eq!(Action::from_name("media"), Some(Action::MediaToggle));
        assert_eq!(Action::from_name("launch_rockets"), None);
        assert_eq!(PoleMode::from_name("different"), Some(PoleMode::Differentiated));
        assert_eq!(PoleMode::from_name("sideways"), None);
    }

    #[test]
    fn handle_swaps_whole_snapshot() {
        let handle = ConfigHandle::default();
        let reader = handle.clone();
        let before = reader.snapshot();

        let previous = handle.replace(EngineConfig::with_thresholds(
            800.0,
            900.0,
            Duration::from_millis(200),
        ));

        assert_eq!(*previous, *before);
        let after = reader.snapshot();
        assert_eq!(after.threshold_trigger, 800.0);
        assert!(after.threshold_reset < 800.0);
        assert_eq!(after.long_press, Duration::from_millis(200));
        // the old snapshot a reader already holds is untouched
        assert_eq!(before.threshold_trigger, DEFAULT_THRESHOLD_TRIGGER);
    }
}
