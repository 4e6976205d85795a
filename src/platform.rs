//! Desktop host capabilities for the binary.
//!
//! Media keys and the voice-assistant strategies are delivered through
//! external tools (`playerctl`, `pactl`, `xdotool` on Linux, `osascript` on
//! macOS) or, with the `desktop` feature, synthesized key presses.

use std::io::{ErrorKind, IsTerminal, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, info};
use magnet_controller::dispatch::{MediaKey, MediaKeys};
use magnet_controller::{
    AssistStrategy, AttemptRecord, Error, FallbackChain, Haptics, Notifier, StatusUpdate,
    StrategyError, StrategySpec,
};
use serde_json::json;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run a short-lived tool to completion.
fn run_tool(program: &str, args: &[&str]) -> magnet_controller::Result<()> {
    let status = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| Error::Capability(format!("{}: {}", program, e)))?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Capability(format!("{} exited with {}", program, status)))
    }
}

/// Run `program` and wait at most `timeout` for it to exit.
///
/// A process still running at the deadline is killed and reported as
/// [`StrategyError::TimedOut`].
fn run_bounded<S: AsRef<std::ffi::OsStr>>(
    program: &str,
    args: &[S],
    timeout: Duration,
) -> Result<(), StrategyError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => StrategyError::Unavailable(format!("{} not installed", program)),
            _ => StrategyError::Rejected(format!("{}: {}", program, e)),
        })?;

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => {
                return Err(StrategyError::Rejected(format!("{} exited with {}", program, status)))
            }
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(StrategyError::TimedOut(timeout));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(StrategyError::Rejected(format!("{}: {}", program, e))),
        }
    }
}

/// Media keys through the platform's media control tools.
#[derive(Debug, Default)]
pub struct CommandMediaKeys;

impl MediaKeys for CommandMediaKeys {
    #[cfg(target_os = "macos")]
    fn send(&mut self, key: MediaKey) -> magnet_controller::Result<()> {
        let script = match key {
            MediaKey::PlayPause => r#"tell application "Music" to playpause"#,
            MediaKey::Next => r#"tell application "Music" to next track"#,
            MediaKey::Previous => r#"tell application "Music" to previous track"#,
            MediaKey::VolumeUp => {
                "set volume output volume ((output volume of (get volume settings)) + 6)"
            }
            MediaKey::VolumeDown => {
                "set volume output volume ((output volume of (get volume settings)) - 6)"
            }
        };
        run_tool("osascript", &["-e", script])
    }

    #[cfg(not(target_os = "macos"))]
    fn send(&mut self, key: MediaKey) -> magnet_controller::Result<()> {
        match key {
            MediaKey::PlayPause => run_tool("playerctl", &["play-pause"]),
            MediaKey::Next => run_tool("playerctl", &["next"]),
            MediaKey::Previous => run_tool("playerctl", &["previous"]),
            MediaKey::VolumeUp => run_tool("pactl", &["set-sink-volume", "@DEFAULT_SINK@", "+5%"]),
            MediaKey::VolumeDown => run_tool("pactl", &["set-sink-volume", "@DEFAULT_SINK@", "-5%"]),
        }
    }
}

/// Launch an external program and wait a bounded time for it to finish.
///
/// A launcher still running at the deadline is killed and counts as timed out.
pub struct CommandStrategy {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandStrategy {
    pub fn new(name: String, program: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            name,
            program,
            args,
            timeout,
        }
    }
}

impl AssistStrategy for CommandStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn attempt(&mut self) -> Result<(), StrategyError> {
        run_bounded(&self.program, &self.args, self.timeout)
    }
}

/// Hold the play/pause key like a long press on a wired headset button.
///
/// Blocks for the hold duration plus at most [`HOLD_MARGIN`] spent in the
/// key tool.
pub struct HeadsetHoldStrategy {
    name: String,
    hold: Duration,
    #[cfg_attr(target_os = "macos", allow(dead_code))]
    tool: String,
}

/// Time the key tool gets, split between key down and key up
#[cfg_attr(target_os = "macos", allow(dead_code))]
const HOLD_MARGIN: Duration = Duration::from_millis(1000);

impl HeadsetHoldStrategy {
    pub fn new(name: String, hold: Duration) -> Self {
        Self::with_tool(name, hold, "xdotool")
    }

    /// Use `tool` in place of `xdotool`; it is called as `tool keydown|keyup XF86AudioPlay`.
    pub fn with_tool(name: String, hold: Duration, tool: impl Into<String>) -> Self {
        Self {
            name,
            hold,
            tool: tool.into(),
        }
    }
}

impl AssistStrategy for HeadsetHoldStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    #[cfg(target_os = "macos")]
    fn attempt(&mut self) -> Result<(), StrategyError> {
        Err(StrategyError::Unavailable("no media key hold on macOS".into()))
    }

    #[cfg(not(target_os = "macos"))]
    fn attempt(&mut self) -> Result<(), StrategyError> {
        let step = HOLD_MARGIN / 2;
        run_bounded(&self.tool, &["keydown", "XF86AudioPlay"], step)?;
        std::thread::sleep(self.hold);
        run_bounded(&self.tool, &["keyup", "XF86AudioPlay"], step).map_err(|e| match e {
            StrategyError::Unavailable(msg) | StrategyError::Rejected(msg) => {
                StrategyError::Rejected(format!("key release failed: {}", msg))
            }
            timed_out => timed_out,
        })
    }
}

/// Press a key combination: every key but the last is held as a modifier.
#[cfg(feature = "desktop")]
pub struct KeyChordStrategy {
    name: String,
    keys: Vec<String>,
}

#[cfg(feature = "desktop")]
impl KeyChordStrategy {
    pub fn new(name: String, keys: Vec<String>) -> Self {
        Self { name, keys }
    }
}

#[cfg(feature = "desktop")]
fn parse_chord_key(name: &str) -> Option<enigo::Key> {
    use enigo::Key;
    let lower = name.trim().to_lowercase();
    let key = match lower.as_str() {
        "meta" | "super" | "cmd" | "command" | "win" => Key::Meta,
        "ctrl" | "control" => Key::Control,
        "alt" | "option" => Key::Alt,
        "shift" => Key::Shift,
        "space" => Key::Space,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Layout(c),
                _ => return None,
            }
        }
    };
    Some(key)
}

#[cfg(feature = "desktop")]
impl AssistStrategy for KeyChordStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn attempt(&mut self) -> Result<(), StrategyError> {
        use enigo::{Enigo, KeyboardControllable};

        #[cfg(target_os = "linux")]
        if std::env::var_os("DISPLAY").is_none() {
            return Err(StrategyError::Unavailable("no X display".into()));
        }

        let keys = self
            .keys
            .iter()
            .map(|k| parse_chord_key(k).ok_or_else(|| StrategyError::Unavailable(format!("unknown key {:?}", k))))
            .collect::<Result<Vec<_>, _>>()?;
        let Some((last, modifiers)) = keys.split_last() else {
            return Err(StrategyError::Unavailable("empty key chord".into()));
        };

        let mut enigo = Enigo::new();
        for key in modifiers {
            enigo.key_down(*key);
        }
        enigo.key_click(*last);
        for key in modifiers.iter().rev() {
            enigo.key_up(*key);
        }
        Ok(())
    }
}

/// Stands in for a strategy this build cannot run.
#[cfg(not(feature = "desktop"))]
pub struct UnsupportedStrategy {
    name: String,
    reason: &'static str,
}

#[cfg(not(feature = "desktop"))]
impl AssistStrategy for UnsupportedStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn attempt(&mut self) -> Result<(), StrategyError> {
        Err(StrategyError::Unavailable(self.reason.into()))
    }
}

/// Logs what would have run and reports success.
pub struct DryRunStrategy {
    name: String,
}

impl AssistStrategy for DryRunStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn attempt(&mut self) -> Result<(), StrategyError> {
        info!("voice strategy {} (dry run)", self.name);
        Ok(())
    }
}

/// Build the voice-assistant chain from stored specs, in order.
pub fn build_chain(specs: &[StrategySpec], dry_run: bool) -> FallbackChain {
    let strategies = specs
        .iter()
        .map(|spec| -> Box<dyn AssistStrategy> {
            if dry_run {
                return Box::new(DryRunStrategy {
                    name: spec.name().to_string(),
                });
            }
            match spec.clone() {
                StrategySpec::Command {
                    name,
                    program,
                    args,
                    timeout_ms,
                } => Box::new(CommandStrategy::new(
                    name,
                    program,
                    args,
                    Duration::from_millis(timeout_ms),
                )),
                #[cfg(feature = "desktop")]
                StrategySpec::KeyChord { name, keys } => Box::new(KeyChordStrategy::new(name, keys)),
                #[cfg(not(feature = "desktop"))]
                StrategySpec::KeyChord { name, .. } => Box::new(UnsupportedStrategy {
                    name,
                    reason: "built without desktop support",
                }),
                StrategySpec::HeadsetHold { name, hold_ms } => {
                    Box::new(HeadsetHoldStrategy::new(name, Duration::from_millis(hold_ms)))
                }
            }
        })
        .collect();

    let chain = FallbackChain::new(strategies);
    debug!("voice chain: {:?}", chain.names());
    chain
}

/// Terminal bell in place of a vibration motor.
///
/// Only available when stderr is a terminal.
#[derive(Debug, Default)]
pub struct BellHaptics;

impl BellHaptics {
    fn ring(count: usize) -> magnet_controller::Result<()> {
        let mut stderr = std::io::stderr();
        for _ in 0..count {
            stderr.write_all(b"\x07")?;
        }
        stderr.flush()?;
        Ok(())
    }
}

impl Haptics for BellHaptics {
    fn is_available(&self) -> bool {
        std::io::stderr().is_terminal()
    }

    fn vibrate_continuous(&mut self) -> magnet_controller::Result<()> {
        Self::ring(1)
    }

    fn vibrate_pattern(&mut self, pattern: &[Duration]) -> magnet_controller::Result<()> {
        // odd slots are the "on" segments
        Self::ring(pattern.iter().skip(1).step_by(2).count())
    }

    fn cancel(&mut self) -> magnet_controller::Result<()> {
        Ok(())
    }
}

/// Structured lines on stdout for whatever UI wraps the process.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn status(&self, update: &StatusUpdate) {
        println!("STATUS:{}", json!(update));
    }

    fn log(&self, line: &str) {
        println!("LOG:{}", json!({ "line": line }));
    }

    fn attempt(&self, record: &AttemptRecord) {
        println!("LOG:{}", json!({ "line": format!("voice assistant: {}", record), "attempt": record }));
    }

    fn exhausted(&self, records: &[AttemptRecord]) {
        println!(
            "LOG:{}",
            json!({
                "line": format!("voice assistant unavailable, all {} strategies failed", records.len()),
                "attempts": records,
            })
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_unavailable() {
        let mut strategy = CommandStrategy::new(
            "ghost".into(),
            "magnet-controller-no-such-program".into(),
            Vec::new(),
            Duration::from_millis(100),
        );
        assert!(matches!(strategy.attempt(), Err(StrategyError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn hung_command_is_killed_at_deadline() {
        let started = Instant::now();
        let result = run_bounded("sleep", &["5"], Duration::from_millis(100));
        assert_eq!(result, Err(StrategyError::TimedOut(Duration::from_millis(100))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_rejected() {
        let result = run_bounded("false", &[] as &[&str], Duration::from_secs(2));
        assert!(matches!(result, Err(StrategyError::Rejected(_))));
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn hung_key_tool_does_not_stall_headset_hold() {
        // `yes` ignores its arguments and never exits on its own
        let mut strategy = HeadsetHoldStrategy::with_tool("hold".into(), Duration::from_millis(100), "yes");
        let started = Instant::now();
        assert!(matches!(strategy.attempt(), Err(StrategyError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn missing_key_tool_is_unavailable() {
        let mut strategy = HeadsetHoldStrategy::with_tool(
            "hold".into(),
            Duration::from_millis(10),
            "magnet-controller-no-such-program",
        );
        assert!(matches!(strategy.attempt(), Err(StrategyError::Unavailable(_))));
    }

    #[test]
    fn dry_run_chain_succeeds_on_first() {
        let mut chain = build_chain(&StrategySpec::default_chain(), true);
        let log = chain.run(&magnet_controller::NullNotifier).unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].succeeded);
    }

    #[test]
    fn chain_keeps_spec_order() {
        let specs = StrategySpec::default_chain();
        let chain = build_chain(&specs, false);
        let expected: Vec<&str> = specs.iter().map(|s| s.name()).collect();
        assert_eq!(chain.names(), expected);
    }
}
