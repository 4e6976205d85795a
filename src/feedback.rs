//! Haptic feedback while a press is held.
//!
//! A continuous buzz runs while a session is armed; a double pulse marks the
//! moment a long press fires. Missing hardware is not an error: the emitter
//! checks once and goes quiet.

use std::time::Duration;

use log::debug;

use crate::trigger::FeedbackCue;
use crate::Result;

/// Off/on/off/on timings for the long-press double pulse.
pub const LONG_PRESS_PATTERN: [Duration; 4] = [
    Duration::from_millis(0),
    Duration::from_millis(200),
    Duration::from_millis(100),
    Duration::from_millis(200),
];

/// Host vibration motor (or whatever stands in for one).
pub trait Haptics: Send {
    fn is_available(&self) -> bool;

    /// Vibrate until [`cancel`](Self::cancel) is called.
    fn vibrate_continuous(&mut self) -> Result<()>;

    /// Play a one-shot pattern of alternating off/on durations, starting off.
    fn vibrate_pattern(&mut self, pattern: &[Duration]) -> Result<()>;

    fn cancel(&mut self) -> Result<()>;
}

/// No vibration hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn is_available(&self) -> bool {
        false
    }

    fn vibrate_continuous(&mut self) -> Result<()> {
        Ok(())
    }

    fn vibrate_pattern(&mut self, _pattern: &[Duration]) -> Result<()> {
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct FeedbackEmitter {
    haptics: Box<dyn Haptics>,
    available: Option<bool>,
    running: bool,
}

impl FeedbackEmitter {
    pub fn new(haptics: Box<dyn Haptics>) -> Self {
        Self {
            haptics,
            available: None,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Begin the continuous buzz. No-op while already running.
    pub fn start_continuous(&mut self) {
        if self.running || !self.available() {
            return;
        }
        match self.haptics.vibrate_continuous() {
            Ok(()) => self.running = true,
            Err(e) => debug!("haptics: continuous vibration failed: {}", e),
        }
    }

    /// Stop the continuous buzz. No-op when not running.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Err(e) = self.haptics.cancel() {
            debug!("haptics: cancel failed: {}", e);
        }
    }

    /// Stop any buzz and play the long-press double pulse.
    pub fn pulse_double(&mut self) {
        self.stop();
        if !self.available() {
            return;
        }
        if let Err(e) = self.haptics.vibrate_pattern(&LONG_PRESS_PATTERN) {
            debug!("haptics: pulse failed: {}", e);
        }
    }

    pub fn apply(&mut self, cue: FeedbackCue) {
        match cue {
            FeedbackCue::StartContinuous => self.start_continuous(),
            FeedbackCue::Stop => self.stop(),
            FeedbackCue::LongPress => self.pulse_double(),
        }
    }

    fn available(&mut self) -> bool {
        *self
            .available
            .get_or_insert_with(|| self.haptics.is_available())
    }
}

impl Default for FeedbackEmitter {
    fn default() -> Self {
        Self::new(Box::new(NoHaptics))
    }
}

impl std::fmt::Debug for FeedbackEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackEmitter")
            .field("available", &self.available)
            .field("running", &self.running)
            .finish()
    }
}
