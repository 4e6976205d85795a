//! Hysteresis trigger: classified samples in, press gestures out.
//!
//! ```text
//!          magnitude > trigger                 held > long_press
//!   Idle ----------------------> Armed ----------------------------> Fired
//!    ^                             |                                   |
//!    |   magnitude <= reset        |  (ShortPress)                     |
//!    +-----------------------------+-----------------------------------+
//!                                      magnitude <= reset (no gesture)
//! ```
//!
//! Samples between the reset and trigger thresholds never start a session,
//! which keeps the trigger from chattering at the boundary. The long-press
//! timer is polled on every sample, so it resolves at the sample rate.

use std::time::Duration;

use log::debug;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::guard::Thresholds;
use crate::signal::{ClassifiedSample, Polarity};

#[cfg(feature = "desktop")]
pub mod hotkey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    ShortPress,
    LongPress,
}

/// One press, tagged with the pole that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Gesture {
    pub kind: GestureKind,
    pub polarity: Polarity,
}

impl Gesture {
    pub fn short(polarity: Polarity) -> Self {
        Self {
            kind: GestureKind::ShortPress,
            polarity,
        }
    }

    pub fn long(polarity: Polarity) -> Self {
        Self {
            kind: GestureKind::LongPress,
            polarity,
        }
    }
}

impl std::fmt::Display for Gesture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            GestureKind::ShortPress => "short press",
            GestureKind::LongPress => "long press",
        };
        write!(f, "{} ({})", kind, self.polarity)
    }
}

/// The live press, from arming until the reset crossing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerSession {
    pub armed_since_ms: u64,
    pub long_press_fired: bool,
    /// Pole seen on the arming sample; fixed for the session
    pub active_polarity: Polarity,
}

impl TriggerSession {
    pub fn held_for(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.armed_since_ms))
    }
}

/// Manual command from outside the sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    ZeroBaseline,
    TriggerVoice,
}

/// Coarse state for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Armed {
        #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
        elapsed: Duration,
    },
    Fired,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Haptic side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackCue {
    /// Session armed: begin the continuous buzz
    StartContinuous,
    /// Session ended before a long press: stop buzzing
    Stop,
    /// Long press fired: stop buzzing and double-pulse
    LongPress,
}

/// Result of feeding one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Step {
    pub gesture: Option<Gesture>,
    pub cue: Option<FeedbackCue>,
}

#[derive(Debug, Clone, Default)]
pub struct TriggerStateMachine {
    session: Option<TriggerSession>,
    last_gesture_ms: Option<u64>,
}

impl TriggerStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.session.is_none()
    }

    pub fn status(&self, now_ms: u64) -> SessionStatus {
        match self.session {
            None => SessionStatus::Idle,
            Some(s) if s.long_press_fired => SessionStatus::Fired,
            Some(s) => SessionStatus::Armed {
                elapsed: s.held_for(now_ms),
            },
        }
    }

    /// Drop the live session without emitting a gesture.
    ///
    /// Returns the dropped session, if there was one.
    pub fn abandon(&mut self) -> Option<TriggerSession> {
        let dropped = self.session.take();
        if dropped.is_some() {
            debug!("trigger: session abandoned");
        }
        dropped
    }

    /// Drop the live session as interference and restart the cooldown at
    /// `now_ms`, as if a gesture had been emitted.
    pub fn suppress(&mut self, now_ms: u64) -> Option<TriggerSession> {
        let dropped = self.session.take();
        self.last_gesture_ms = Some(now_ms);
        if dropped.is_some() {
            debug!("trigger: session suppressed at {} ms", now_ms);
        }
        dropped
    }

    /// Advance on one classified sample, reading thresholds from `config`.
    pub fn step(&mut self, sample: &ClassifiedSample, config: &EngineConfig) -> Step {
        self.step_within(sample, config, Thresholds::of(config))
    }

    /// Like [`step`](Self::step), but against `thresholds` in place of the
    /// configured ones.
    pub fn step_within(&mut self, sample: &ClassifiedSample, config: &EngineConfig, thresholds: Thresholds) -> Step {
        let now = sample.timestamp_ms;

        if self.session.is_none() {
            return self.try_arm(sample, config, thresholds.trigger);
        }
        let Some(session) = self.session.as_mut() else {
            return Step::default();
        };

        if sample.magnitude <= thresholds.reset {
            let ended = *session;
            self.session = None;
            if ended.long_press_fired {
                debug!("trigger: released after long press");
                return Step::default();
            }
            debug!("trigger: released after {:?}", ended.held_for(now));
            self.last_gesture_ms = Some(now);
            return Step {
                gesture: Some(Gesture::short(ended.active_polarity)),
                cue: Some(FeedbackCue::Stop),
            };
        }

        if !session.long_press_fired && session.held_for(now) > config.long_press {
            session.long_press_fired = true;
            self.last_gesture_ms = Some(now);
            debug!("trigger: long press after {:?}", session.held_for(now));
            return Step {
                gesture: Some(Gesture::long(session.active_polarity)),
                cue: Some(FeedbackCue::LongPress),
            };
        }

        Step::default()
    }

    fn try_arm(&mut self, sample: &ClassifiedSample, config: &EngineConfig, trigger: f32) -> Step {
        let now = sample.timestamp_ms;
        if sample.magnitude <= trigger
            || !config.pole_mode.admits(sample.polarity)
            || !self.cooled_down(now, config.rearm_cooldown)
        {
            return Step::default();
        }

        self.session = Some(TriggerSession {
            armed_since_ms: now,
            long_press_fired: false,
            active_polarity: sample.polarity,
        });
        debug!(
            "trigger: armed at {} ms ({:.0} µT, pole {})",
            now, sample.magnitude, sample.polarity
        );
        Step {
            gesture: None,
            cue: Some(FeedbackCue::StartContinuous),
        }
    }

    fn cooled_down(&self, now_ms: u64, cooldown: Duration) -> bool {
        match self.last_gesture_ms {
            Some(last) => Duration::from_millis(now_ms.saturating_sub(last)) >= cooldown,
            None => true,
        }
    }
}
