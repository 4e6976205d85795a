//! Field guards applied before the trigger state machine.
//!
//! [`NoiseFloor`] tracks how noisy the quiet field is and lifts the trigger
//! and reset thresholds above it. [`StrongFieldGuard`] spots a field that is
//! very strong and unnaturally still (a magnet lying on the sensor, a speaker
//! nearby) and cancels the press it would otherwise produce.

use std::time::Duration;

use log::{info, warn};

use crate::config::EngineConfig;

/// Reset threshold never falls below this share of the effective trigger.
const ADAPTIVE_RESET_RATIO: f32 = 0.6;
/// Statistics are halved past this many samples so old noise fades out.
const NOISE_SAMPLE_CAP: u32 = 20_000;

/// Trigger and reset levels the state machine compares against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub trigger: f32,
    pub reset: f32,
}

impl Thresholds {
    pub fn of(config: &EngineConfig) -> Self {
        Self {
            trigger: config.threshold_trigger,
            reset: config.threshold_reset,
        }
    }
}

/// Running mean and spread of quiet, idle magnitudes (Welford).
#[derive(Debug, Clone, Default)]
pub struct NoiseFloor {
    samples: u32,
    mean: f32,
    m2: f32,
}

impl NoiseFloor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `magnitude` if it is below `reset`; call only while idle.
    pub fn observe(&mut self, magnitude: f32, reset: f32) {
        if magnitude > reset {
            return;
        }
        self.samples += 1;
        let delta = magnitude - self.mean;
        self.mean += delta / self.samples as f32;
        self.m2 += delta * (magnitude - self.mean);
        if self.samples > NOISE_SAMPLE_CAP {
            self.samples /= 2;
            self.m2 /= 2.0;
        }
    }

    pub fn mean(&self) -> f32 {
        self.mean
    }

    pub fn std_dev(&self) -> f32 {
        if self.samples > 1 {
            (self.m2 / (self.samples - 1) as f32).sqrt()
        } else {
            0.0
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Configured thresholds, lifted to `mean + sigma·σ` when `noise_sigma` is set.
    pub fn thresholds(&self, config: &EngineConfig) -> Thresholds {
        let configured = Thresholds::of(config);
        if config.noise_sigma <= 0.0 {
            return configured;
        }
        let trigger = configured
            .trigger
            .max(self.mean + config.noise_sigma * self.std_dev());
        Thresholds {
            trigger,
            reset: configured.reset.max(trigger * ADAPTIVE_RESET_RATIO),
        }
    }
}

/// When a strong, steady field counts as interference.
///
/// Switched off by a zero duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrongFieldConfig {
    /// Magnitude (µT) above which the field is watched
    pub threshold: f32,
    /// How long it must stay above `threshold` and within `jitter`
    pub duration: Duration,
    /// Max spread (µT) of magnitudes that still counts as steady
    pub jitter: f32,
}

impl StrongFieldConfig {
    pub const DEFAULT_THRESHOLD: f32 = 1800.0;
    pub const DEFAULT_JITTER: f32 = 40.0;

    pub fn disabled() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            duration: Duration::ZERO,
            jitter: Self::DEFAULT_JITTER,
        }
    }

    pub fn recommended() -> Self {
        Self {
            duration: Duration::from_millis(400),
            ..Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.duration.is_zero() && self.threshold > 0.0
    }

    pub fn sanitized(mut self) -> Self {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            warn!("strong-field threshold {} is unusable, using default", self.threshold);
            self.threshold = Self::DEFAULT_THRESHOLD;
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            warn!("strong-field jitter {} is unusable, using default", self.jitter);
            self.jitter = Self::DEFAULT_JITTER;
        }
        self
    }
}

impl Default for StrongFieldConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// What the guard decided for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Normal processing
    Pass,
    /// Interference just detected; cancel whatever press is pending
    Started,
    /// Interference continues; skip the state machine
    Ongoing,
}

#[derive(Debug, Clone, Default)]
pub struct StrongFieldGuard {
    since_ms: Option<u64>,
    min: f32,
    max: f32,
    latched: bool,
}

impl StrongFieldGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, magnitude: f32, now_ms: u64, config: &StrongFieldConfig) -> Suppression {
        if !config.is_enabled() {
            return Suppression::Pass;
        }

        if magnitude <= config.threshold {
            if magnitude < config.threshold - config.jitter {
                self.latched = false;
            }
            self.since_ms = None;
            self.min = magnitude;
            self.max = magnitude;
            return Suppression::Pass;
        }

        let since = match self.since_ms {
            Some(since) => {
                self.min = self.min.min(magnitude);
                self.max = self.max.max(magnitude);
                since
            }
            None => {
                self.since_ms = Some(now_ms);
                self.min = magnitude;
                self.max = magnitude;
                now_ms
            }
        };

        let steady = self.max - self.min <= config.jitter;
        let lasted = Duration::from_millis(now_ms.saturating_sub(since)) >= config.duration;
        if !(steady && lasted) {
            return Suppression::Pass;
        }
        if self.latched {
            return Suppression::Ongoing;
        }
        self.latched = true;
        info!("strong steady field ({:.0} µT), ignoring press", magnitude);
        Suppression::Started
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
