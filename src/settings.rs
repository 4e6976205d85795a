//! Settings store boundary.
//!
//! The store keeps the controller's preferences as plain string/number keys.
//! [`Settings`] mirrors those keys one to one; [`Settings::to_config`] is the
//! single place where they are parsed into the typed [`EngineConfig`].
//! Unknown names never reach the engine: they fall back to defaults with a
//! warning.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::calibration::AutoZeroConfig;
use crate::config::{Action, ActionMap, EngineConfig, PoleMode};
use crate::guard::StrongFieldConfig;
use crate::{Error, Result};

const SETTINGS_DIR: &str = "magnet-controller";
const SETTINGS_FILE: &str = "settings.json";

/// Time a launched command gets to exit before it is killed.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 2000;
/// Length of the simulated headset-button hold.
pub const DEFAULT_HOLD_MS: u64 = 1000;

/// One entry of the voice-assistant fallback chain, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySpec {
    /// Launch an external program
    Command {
        name: String,
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_command_timeout_ms")]
        timeout_ms: u64,
    },
    /// Press a key combination, e.g. `["meta", "c"]`
    KeyChord { name: String, keys: Vec<String> },
    /// Hold the play/pause key the way a wired headset button is held
    HeadsetHold {
        name: String,
        #[serde(default = "default_hold_ms")]
        hold_ms: u64,
    },
}

fn default_command_timeout_ms() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

fn default_hold_ms() -> u64 {
    DEFAULT_HOLD_MS
}

impl StrategySpec {
    pub fn name(&self) -> &str {
        match self {
            StrategySpec::Command { name, .. }
            | StrategySpec::KeyChord { name, .. }
            | StrategySpec::HeadsetHold { name, .. } => name,
        }
    }

    fn command(name: &str, program: &str, args: &[&str]) -> Self {
        StrategySpec::Command {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
        }
    }

    /// Platform assistant first, generic fallbacks after, headset hold last.
    #[cfg(target_os = "macos")]
    pub fn default_chain() -> Vec<Self> {
        vec![
            Self::command("siri", "open", &["-a", "Siri"]),
            Self::command("siri_bundle", "open", &["-b", "com.apple.Siri"]),
            StrategySpec::KeyChord {
                name: "assistant_shortcut".into(),
                keys: vec!["ctrl".into(), "alt".into(), "s".into()],
            },
            Self::command("shortcuts", "shortcuts", &["run", "Voice Assistant"]),
            StrategySpec::HeadsetHold {
                name: "headset_hold".into(),
                hold_ms: DEFAULT_HOLD_MS,
            },
        ]
    }

    /// Platform assistant first, generic fallbacks after, headset hold last.
    #[cfg(not(target_os = "macos"))]
    pub fn default_chain() -> Vec<Self> {
        vec![
            Self::command("mycroft", "mycroft-listen", &[]),
            Self::command("mycroft_start", "mycroft-start", &["listen"]),
            StrategySpec::KeyChord {
                name: "assistant_shortcut".into(),
                keys: vec!["meta".into(), "c".into()],
            },
            Self::command("ovos", "ovos-listen", &[]),
            StrategySpec::HeadsetHold {
                name: "headset_hold".into(),
                hold_ms: DEFAULT_HOLD_MS,
            },
        ]
    }
}

/// Raw preferences as the store holds them.
///
/// Thresholds are µT, durations milliseconds. Every key is optional in the
/// file; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "press_threshold")]
    pub threshold_trigger: f32,
    #[serde(alias = "release_threshold")]
    pub threshold_reset: f32,
    pub long_press_duration: u64,
    pub pole_mode: String,
    pub n_short_action: String,
    pub n_long_action: String,
    pub s_short_action: String,
    pub s_long_action: String,
    pub smoothing_window: usize,
    pub rearm_cooldown_ms: u64,
    pub auto_zero_threshold: f32,
    pub auto_zero_duration_ms: u64,
    pub auto_zero_stability_band: f32,
    pub auto_zero_stability_duration_ms: u64,
    /// 0 keeps the thresholds fixed
    pub noise_sigma: f32,
    pub strong_suppression_threshold: f32,
    /// 0 disables strong-field suppression
    pub strong_suppression_duration_ms: u64,
    pub strong_suppression_jitter: f32,
    pub zero_on_start: bool,
    pub status_interval_ms: u64,
    pub voice_chain: Vec<StrategySpec>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut settings = Self::from_config(&EngineConfig::default());
        // a freshly started controller takes its resting field as zero
        settings.zero_on_start = true;
        settings
    }
}

impl Settings {
    /// Store form of `config`, with the platform's default voice chain.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            threshold_trigger: config.threshold_trigger,
            threshold_reset: config.threshold_reset,
            long_press_duration: config.long_press.as_millis() as u64,
            pole_mode: config.pole_mode.as_str().to_string(),
            n_short_action: config.actions.n_short.as_str().to_string(),
            n_long_action: config.actions.n_long.as_str().to_string(),
            s_short_action: config.actions.s_short.as_str().to_string(),
            s_long_action: config.actions.s_long.as_str().to_string(),
            smoothing_window: config.smoothing_window,
            rearm_cooldown_ms: config.rearm_cooldown.as_millis() as u64,
            auto_zero_threshold: config.auto_zero.threshold,
            auto_zero_duration_ms: config.auto_zero.duration.as_millis() as u64,
            auto_zero_stability_band: config.auto_zero.stability_band,
            auto_zero_stability_duration_ms: config.auto_zero.stability_duration.as_millis() as u64,
            noise_sigma: config.noise_sigma,
            strong_suppression_threshold: config.strong_field.threshold,
            strong_suppression_duration_ms: config.strong_field.duration.as_millis() as u64,
            strong_suppression_jitter: config.strong_field.jitter,
            zero_on_start: config.zero_on_start,
            status_interval_ms: config.status_interval.as_millis() as u64,
            voice_chain: StrategySpec::default_chain(),
        }
    }

    /// Parse into a typed, sanitized configuration. Never fails.
    pub fn to_config(&self) -> EngineConfig {
        let defaults = ActionMap::default();
        let pole_mode = PoleMode::from_name(&self.pole_mode).unwrap_or_else(|| {
            warn!("unknown pole_mode {:?}, using both", self.pole_mode);
            PoleMode::Both
        });

        EngineConfig {
            threshold_trigger: self.threshold_trigger,
            threshold_reset: self.threshold_reset,
            long_press: Duration::from_millis(self.long_press_duration),
            pole_mode,
            actions: ActionMap {
                n_short: action("n_short_action", &self.n_short_action, defaults.n_short),
                n_long: action("n_long_action", &self.n_long_action, defaults.n_long),
                s_short: action("s_short_action", &self.s_short_action, defaults.s_short),
                s_long: action("s_long_action", &self.s_long_action, defaults.s_long),
            },
            smoothing_window: self.smoothing_window,
            rearm_cooldown: Duration::from_millis(self.rearm_cooldown_ms),
            auto_zero: AutoZeroConfig {
                threshold: self.auto_zero_threshold,
                duration: Duration::from_millis(self.auto_zero_duration_ms),
                stability_band: self.auto_zero_stability_band,
                stability_duration: Duration::from_millis(self.auto_zero_stability_duration_ms),
            },
            noise_sigma: self.noise_sigma,
            strong_field: StrongFieldConfig {
                threshold: self.strong_suppression_threshold,
                duration: Duration::from_millis(self.strong_suppression_duration_ms),
                jitter: self.strong_suppression_jitter,
            },
            zero_on_start: self.zero_on_start,
            status_interval: Duration::from_millis(self.status_interval_ms),
        }
        .sanitized()
    }
}

fn action(key: &str, name: &str, fallback: Action) -> Action {
    Action::from_name(name).unwrap_or_else(|| {
        warn!("unknown {} {:?}, using {}", key, name, fallback);
        fallback
    })
}

/// Durable home of [`Settings`].
pub trait SettingsStore {
    fn load(&self) -> Result<Settings>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// Settings kept as pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonSettingsFile {
    path: PathBuf,
}

impl JsonSettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/magnet-controller/settings.json`
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));

        config_dir.join(SETTINGS_DIR).join(SETTINGS_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonSettingsFile {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl SettingsStore for JsonSettingsFile {
    /// A missing file yields the defaults.
    fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            debug!("no settings at {}, using defaults", self.path.display());
            return Ok(Settings::default());
        }
        let text = fs::read_to_string(&self.path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Settings(format!("{}: {}", self.path.display(), e)))
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Settings(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let text = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, text)?;
        info!("settings saved to {}", self.path.display());
        Ok(())
    }
}
