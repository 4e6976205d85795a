//! Keyboard control keys
//!
//! Uses `rdev` to listen for global key presses that stand in for the
//! controller's manual buttons (zero the baseline, start the voice assistant).

use std::sync::mpsc;
use std::sync::Mutex;

use log::{error, info};
use rdev::{listen, Event, EventType, Key};

use super::ControlCommand;
use crate::{Error, Result};

/// Global hotkeys for the manual commands.
///
/// Commands are queued from the listener thread and polled by the sample
/// loop with [`try_recv`](Self::try_recv).
pub struct ControlHotkeys {
    /// Receiver wrapped in Mutex for Sync
    event_rx: Mutex<mpsc::Receiver<ControlCommand>>,
}

impl ControlHotkeys {
    /// Start listening. A `None` key leaves that command unbound.
    pub fn spawn(zero_key: Option<Key>, voice_key: Option<Key>) -> Result<Self> {
        if zero_key.is_some() && zero_key == voice_key {
            return Err(Error::Config(format!(
                "zero and voice hotkeys are both {:?}",
                zero_key
            )));
        }

        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("magnet-hotkeys".into())
            .spawn(move || {
                let result = listen(move |event: Event| {
                    if let EventType::KeyPress(key) = event.event_type {
                        let command = if Some(key) == zero_key {
                            ControlCommand::ZeroBaseline
                        } else if Some(key) == voice_key {
                            ControlCommand::TriggerVoice
                        } else {
                            return;
                        };
                        let _ = tx.send(command);
                    }
                });
                if let Err(e) = result {
                    error!("hotkey listener stopped: {:?}", e);
                }
            })?;

        info!("hotkeys: zero={:?} voice={:?}", zero_key, voice_key);
        Ok(Self {
            event_rx: Mutex::new(rx),
        })
    }

    /// Next pending command (non-blocking)
    pub fn try_recv(&self) -> Option<ControlCommand> {
        self.event_rx.lock().ok()?.try_recv().ok()
    }
}

/// Parse a key name as given on the command line.
pub fn parse_key(name: &str) -> Option<Key> {
    match name.trim().to_lowercase().as_str() {
        "function" | "fn" => Some(Key::Function),
        "f1" => Some(Key::F1),
        "f2" => Some(Key::F2),
        "f3" => Some(Key::F3),
        "f4" => Some(Key::F4),
        "f5" => Some(Key::F5),
        "f6" => Some(Key::F6),
        "f7" => Some(Key::F7),
        "f8" => Some(Key::F8),
        "f9" => Some(Key::F9),
        "f10" => Some(Key::F10),
        "f11" => Some(Key::F11),
        "f12" => Some(Key::F12),
        "pause" => Some(Key::Pause),
        "scrolllock" => Some(Key::ScrollLock),
        "insert" => Some(Key::Insert),
        "home" => Some(Key::Home),
        "end" => Some(Key::End),
        "pageup" => Some(Key::PageUp),
        "pagedown" => Some(Key::PageDown),
        "controlright" => Some(Key::ControlRight),
        "metaright" => Some(Key::MetaRight),
        "shiftright" => Some(Key::ShiftRight),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_are_case_insensitive() {
        assert_eq!(parse_key("F9"), Some(Key::F9));
        assert_eq!(parse_key(" pause "), Some(Key::Pause));
        assert_eq!(parse_key("fn"), Some(Key::Function));
    }

    #[test]
    fn unknown_key_names_are_rejected() {
        assert_eq!(parse_key("hyper"), None);
        assert_eq!(parse_key(""), None);
    }

    #[test]
    fn same_key_for_both_commands_is_rejected() {
        assert!(matches!(
            ControlHotkeys::spawn(Some(Key::F9), Some(Key::F9)),
            Err(Error::Config(_))
        ));
    }
}
