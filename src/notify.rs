//! Status and log output towards whatever UI is listening.
//!
//! The engine calls a [`Notifier`] synchronously after it changes state. It
//! does not care whether anyone is listening; [`NullNotifier`] is a valid
//! choice.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::dispatch::fallback::AttemptRecord;
use crate::signal::Polarity;
use crate::trigger::SessionStatus;

/// Lines kept by [`LogHistory`].
pub const RECENT_LOG_CAPACITY: usize = 100;

/// Periodic live view of the sensor and trigger state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub timestamp_ms: u64,
    /// Offset-corrected field, µT
    pub axes: [f32; 3],
    pub magnitude: f32,
    pub polarity: Polarity,
    pub session: SessionStatus,
}

/// Observer for engine output.
///
/// Every method has a default so implementors only pick what they show.
/// Attempt and exhaustion reports fall back to plain log lines.
pub trait Notifier: Send + Sync {
    /// Throttled live status
    fn status(&self, _update: &StatusUpdate) {}

    /// Human-readable event line
    fn log(&self, _line: &str) {}

    /// One voice-assistant strategy finished
    fn attempt(&self, record: &AttemptRecord) {
        self.log(&format!("voice assistant: {}", record));
    }

    /// Every voice-assistant strategy failed
    fn exhausted(&self, records: &[AttemptRecord]) {
        let summary: Vec<String> = records.iter().map(|r| r.to_string()).collect();
        self.log(&format!(
            "voice assistant unavailable, all {} strategies failed: {}",
            records.len(),
            summary.join("; ")
        ));
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {}

/// Rate limit for status pushes, driven by sample timestamps.
#[derive(Debug, Clone, Default)]
pub struct StatusThrottle {
    last_ms: Option<u64>,
}

impl StatusThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a push at `now_ms` is due, given the minimum `interval`.
    pub fn ready(&mut self, now_ms: u64, interval: Duration) -> bool {
        let due = match self.last_ms {
            None => true,
            Some(last) => Duration::from_millis(now_ms.saturating_sub(last)) >= interval,
        };
        if due {
            self.last_ms = Some(now_ms);
        }
        due
    }
}

/// Keeps the most recent log lines for late-attaching displays and forwards
/// everything to an inner notifier.
pub struct LogHistory<N> {
    inner: N,
    recent: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl<N: Notifier> LogHistory<N> {
    pub fn new(inner: N) -> Self {
        Self::with_capacity(inner, RECENT_LOG_CAPACITY)
    }

    pub fn with_capacity(inner: N, capacity: usize) -> Self {
        Self {
            inner,
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<String> {
        let recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.iter().cloned().collect()
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    fn remember(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        if recent.len() >= self.capacity {
            recent.pop_front();
        }
        recent.push_back(line.to_string());
    }
}

impl<N: Notifier> Notifier for LogHistory<N> {
    fn status(&self, update: &StatusUpdate) {
        self.inner.status(update);
    }

    fn log(&self, line: &str) {
        self.remember(line);
        self.inner.log(line);
    }

    fn attempt(&self, record: &AttemptRecord) {
        self.remember(&format!("voice assistant: {}", record));
        self.inner.attempt(record);
    }

    fn exhausted(&self, records: &[AttemptRecord]) {
        self.remember(&format!(
            "voice assistant unavailable, all {} strategies failed",
            records.len()
        ));
        self.inner.exhausted(records);
    }
}
