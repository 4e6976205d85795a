//! Executing actions against the host.
//!
//! Media actions are a single key send, reported but never retried. The
//! voice assistant goes through the [`FallbackChain`]. Either way the result
//! is a [`DispatchOutcome`] with one [`AttemptRecord`] per host call.

use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::config::Action;
use crate::notify::Notifier;
use crate::Result;

pub mod fallback;
pub mod worker;

use fallback::{AttemptRecord, FallbackChain};

/// Media keys the host is asked to press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKey {
    PlayPause,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
}

impl MediaKey {
    /// The key behind a media action; `None` for the voice assistant.
    pub fn for_action(action: Action) -> Option<Self> {
        match action {
            Action::MediaToggle => Some(MediaKey::PlayPause),
            Action::MediaNext => Some(MediaKey::Next),
            Action::MediaPrevious => Some(MediaKey::Previous),
            Action::VolumeUp => Some(MediaKey::VolumeUp),
            Action::VolumeDown => Some(MediaKey::VolumeDown),
            Action::VoiceAssist => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKey::PlayPause => "play_pause",
            MediaKey::Next => "next",
            MediaKey::Previous => "previous",
            MediaKey::VolumeUp => "volume_up",
            MediaKey::VolumeDown => "volume_down",
        }
    }
}

/// Host capability that delivers media key presses.
pub trait MediaKeys: Send {
    fn send(&mut self, key: MediaKey) -> Result<()>;
}

/// Accepts every key and does nothing; for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMediaKeys;

impl MediaKeys for NullMediaKeys {
    fn send(&mut self, key: MediaKey) -> Result<()> {
        info!("media key {} (dry run)", key.as_str());
        Ok(())
    }
}

/// What happened when an action was executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub action: Action,
    pub succeeded: bool,
    pub attempts: Vec<AttemptRecord>,
}

pub struct ActionDispatcher {
    media: Box<dyn MediaKeys>,
    chain: FallbackChain,
}

impl ActionDispatcher {
    pub fn new(media: Box<dyn MediaKeys>, chain: FallbackChain) -> Self {
        Self { media, chain }
    }

    /// Run `action` once. Failures are reported through `notifier` and the
    /// returned outcome; nothing is retried.
    pub fn dispatch(&mut self, action: Action, notifier: &dyn Notifier) -> DispatchOutcome {
        let Some(key) = MediaKey::for_action(action) else {
            return self.assist(notifier);
        };

        let name = format!("media_key:{}", key.as_str());
        let record = match self.media.send(key) {
            Ok(()) => {
                info!("sent {}", name);
                AttemptRecord::success(name)
            }
            Err(e) => {
                warn!("sending {} failed: {}", name, e);
                notifier.log(&format!("media key {} failed: {}", key.as_str(), e));
                AttemptRecord::failure(name, e)
            }
        };
        DispatchOutcome {
            action,
            succeeded: record.succeeded,
            attempts: vec![record],
        }
    }

    fn assist(&mut self, notifier: &dyn Notifier) -> DispatchOutcome {
        let (succeeded, attempts) = self.chain.try_in_order(notifier);
        DispatchOutcome {
            action: Action::VoiceAssist,
            succeeded,
            attempts,
        }
    }
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

/// Where the engine hands resolved actions.
pub trait ActionSink: Send {
    /// Execute or enqueue `action`. Returns the outcome when it ran inline.
    fn submit(&mut self, action: Action) -> Option<DispatchOutcome>;
}

/// Runs each action on the calling thread before returning.
pub struct InlineDispatch {
    dispatcher: ActionDispatcher,
    notifier: Arc<dyn Notifier>,
}

impl InlineDispatch {
    pub fn new(dispatcher: ActionDispatcher, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            dispatcher,
            notifier,
        }
    }
}

impl ActionSink for InlineDispatch {
    fn submit(&mut self, action: Action) -> Option<DispatchOutcome> {
        Some(self.dispatcher.dispatch(action, self.notifier.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::fallback::{AssistStrategy, StrategyError};
    use crate::notify::NullNotifier;
    use crate::Error;
    use std::sync::Mutex;

    struct Keys {
        sent: Arc<Mutex<Vec<MediaKey>>>,
        fail: bool,
    }

    impl MediaKeys for Keys {
        fn send(&mut self, key: MediaKey) -> Result<()> {
            self.sent.lock().unwrap().push(key);
            if self.fail {
                Err(Error::Capability("no media session".into()))
            } else {
                Ok(())
            }
        }
    }

    struct Always(bool);

    impl AssistStrategy for Always {
        fn name(&self) -> &str {
            if self.0 {
                "works"
            } else {
                "broken"
            }
        }

        fn attempt(&mut self) -> std::result::Result<(), StrategyError> {
            if self.0 {
                Ok(())
            } else {
                Err(StrategyError::Rejected("nope".into()))
            }
        }
    }

    fn dispatcher(fail_keys: bool, chain: Vec<Box<dyn AssistStrategy>>) -> (ActionDispatcher, Arc<Mutex<Vec<MediaKey>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let keys = Keys {
            sent: sent.clone(),
            fail: fail_keys,
        };
        (ActionDispatcher::new(Box::new(keys), FallbackChain::new(chain)), sent)
    }

    #[test]
    fn media_toggle_is_one_key_press() {
        let (mut d, sent) = dispatcher(false, Vec::new());
        let outcome = d.dispatch(Action::MediaToggle, &NullNotifier);
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, vec![AttemptRecord::success("media_key:play_pause")]);
        assert_eq!(*sent.lock().unwrap(), vec![MediaKey::PlayPause]);
    }

    #[test]
    fn media_failure_is_reported_not_retried() {
        let (mut d, sent) = dispatcher(true, Vec::new());
        let outcome = d.dispatch(Action::VolumeDown, &NullNotifier);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(*sent.lock().unwrap(), vec![MediaKey::VolumeDown]);
    }

    #[test]
    fn voice_assist_goes_through_chain_and_skips_media_keys() {
        let (mut d, sent) = dispatcher(false, vec![Box::new(Always(false)), Box::new(Always(true))]);
        let outcome = d.dispatch(Action::VoiceAssist, &NullNotifier);
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts.len(), 2);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn exhausted_chain_is_a_failed_outcome() {
        let (mut d, _) = dispatcher(false, vec![Box::new(Always(false))]);
        let outcome = d.dispatch(Action::VoiceAssist, &NullNotifier);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts[0].strategy, "broken");
    }

    #[test]
    fn every_media_action_has_a_key() {
        for action in [
            Action::MediaToggle,
            Action::MediaNext,
            Action::MediaPrevious,
            Action::VolumeUp,
            Action::VolumeDown,
        ] {
            assert!(MediaKey::for_action(action).is_some());
        }
        assert!(MediaKey::for_action(Action::VoiceAssist).is_none());
    }
}
