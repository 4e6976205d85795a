//! Zero-offset baseline for the magnetometer.
//!
//! The earth's field and nearby steel give every reading a constant offset.
//! The calibrator remembers an offset vector and subtracts it from each raw
//! sample. The offset is captured from the latest raw reading, either on
//! request or automatically once the field has been quiet for long enough.

use std::time::Duration;

use log::{info, warn};

use crate::signal::Sample;

/// Rules for re-zeroing without user involvement.
///
/// Each rule is switched off by a zero duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoZeroConfig {
    /// Field (µT, after offset) under which the low-field rule counts
    pub threshold: f32,
    /// How long the field must stay under `threshold`
    pub duration: Duration,
    /// Max spread (µT) of magnitudes for the stability rule
    pub stability_band: f32,
    /// How long magnitudes must stay within `stability_band`
    pub stability_duration: Duration,
}

impl AutoZeroConfig {
    pub const DEFAULT_THRESHOLD: f32 = 80.0;
    pub const DEFAULT_STABILITY_BAND: f32 = 20.0;

    pub fn disabled() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            duration: Duration::ZERO,
            stability_band: Self::DEFAULT_STABILITY_BAND,
            stability_duration: Duration::ZERO,
        }
    }

    /// Both rules on with four second windows.
    pub fn recommended() -> Self {
        Self {
            duration: Duration::from_secs(4),
            stability_duration: Duration::from_secs(4),
            ..Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.duration.is_zero() || !self.stability_duration.is_zero()
    }

    pub fn sanitized(mut self) -> Self {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            warn!("auto-zero threshold {} is unusable, using default", self.threshold);
            self.threshold = Self::DEFAULT_THRESHOLD;
        }
        if !self.stability_band.is_finite() || self.stability_band < 0.0 {
            warn!("auto-zero stability band {} is unusable, using default", self.stability_band);
            self.stability_band = Self::DEFAULT_STABILITY_BAND;
        }
        self
    }
}

impl Default for AutoZeroConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Why the baseline moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroReason {
    Manual,
    Startup,
    /// Field stayed under the auto-zero threshold
    LowField,
    /// Field stayed within the stability band
    Stable,
}

impl std::fmt::Display for ZeroReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ZeroReason::Manual => "manual",
            ZeroReason::Startup => "start-up",
            ZeroReason::LowField => "low field",
            ZeroReason::Stable => "stable field",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy)]
struct StableWindow {
    since_ms: u64,
    min: f32,
    max: f32,
}

#[derive(Debug, Clone)]
pub struct Calibrator {
    offset: [f32; 3],
    last_raw: Option<Sample>,
    zero_pending: bool,
    low_since_ms: Option<u64>,
    stable: Option<StableWindow>,
    /// Set after an automatic zero until the field rises clearly again
    latched: bool,
}

impl Calibrator {
    pub fn new(zero_on_start: bool) -> Self {
        Self {
            offset: [0.0; 3],
            last_raw: None,
            zero_pending: zero_on_start,
            low_since_ms: None,
            stable: None,
            latched: false,
        }
    }

    pub fn offset(&self) -> [f32; 3] {
        self.offset
    }

    /// Record a raw sample and return it with the baseline removed.
    ///
    /// The second value is set when this sample became the start-up baseline.
    pub fn correct(&mut self, raw: &Sample) -> (Sample, Option<ZeroReason>) {
        self.last_raw = Some(*raw);
        let mut zeroed = None;
        if self.zero_pending {
            self.zero_pending = false;
            self.zero(ZeroReason::Startup);
            zeroed = Some(ZeroReason::Startup);
        }
        (raw.minus(self.offset), zeroed)
    }

    /// Take the latest raw reading as the new zero.
    pub fn zero(&mut self, reason: ZeroReason) -> [f32; 3] {
        if let Some(raw) = self.last_raw {
            self.offset = raw.axes();
        }
        self.low_since_ms = None;
        self.stable = None;
        self.latched = false;
        info!(
            "baseline zeroed ({}): x={:.0} y={:.0} z={:.0}",
            reason, self.offset[0], self.offset[1], self.offset[2]
        );
        self.offset
    }

    /// Forget partially elapsed auto-zero windows, e.g. while a press is held.
    pub fn hold(&mut self) {
        self.low_since_ms = None;
        self.stable = None;
    }

    /// Feed one corrected magnitude to the auto-zero rules.
    ///
    /// Re-zeroes and returns the reason when a rule has been satisfied.
    pub fn observe(
        &mut self,
        magnitude: f32,
        now_ms: u64,
        config: &AutoZeroConfig,
    ) -> Option<ZeroReason> {
        if !config.is_enabled() {
            return None;
        }

        if self.latched {
            if magnitude > config.threshold + config.stability_band {
                self.latched = false;
            } else {
                return None;
            }
        }

        let mut reason = None;

        if !config.duration.is_zero() {
            if magnitude < config.threshold {
                let since = *self.low_since_ms.get_or_insert(now_ms);
                if elapsed(since, now_ms) >= config.duration {
                    reason = Some(ZeroReason::LowField);
                }
            } else {
                self.low_since_ms = None;
            }
        }

        if !config.stability_duration.is_zero() {
            let window = self.stable.get_or_insert(StableWindow {
                since_ms: now_ms,
                min: magnitude,
                max: magnitude,
            });
            window.min = window.min.min(magnitude);
            window.max = window.max.max(magnitude);

            if window.max - window.min <= config.stability_band {
                if reason.is_none() && elapsed(window.since_ms, now_ms) >= config.stability_duration {
                    reason = Some(ZeroReason::Stable);
                }
            } else {
                *window = StableWindow {
                    since_ms: now_ms,
                    min: magnitude,
                    max: magnitude,
                };
            }
        } else {
            self.stable = None;
        }

        if let Some(reason) = reason {
            self.zero(reason);
            self.latched = true;
        }
        reason
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(false)
    }
}

fn elapsed(since_ms: u64, now_ms: u64) -> Duration {
    Duration::from_millis(now_ms.saturating_sub(since_ms))
}
