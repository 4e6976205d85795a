//! magnet-controller binary - magnet gestures as media and voice-assistant buttons
//!
//! Reads magnetometer samples from stdin (one `x y z` or `t_ms x y z` line per
//! reading) or from a BLE sensor, and reports on stdout with `STATUS:{json}`
//! and `LOG:{json}` lines. For library usage, see the crate docs.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use magnet_controller::{
    ActionDispatcher, ConfigHandle, ControlCommand, DispatchWorker, JsonSettingsFile, LineSource,
    LogHistory, MagnetEngine, MediaKeys, Notifier, NullMediaKeys, Sample, SampleSource, Settings,
    SettingsStore,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[cfg(feature = "ble")]
mod ble;
mod platform;

use platform::{BellHaptics, CommandMediaKeys, ConsoleNotifier};

/// How often the settings file is checked for changes
const SETTINGS_POLL: Duration = Duration::from_secs(1);
/// Longest a manual command waits while no samples arrive
const COMMAND_POLL: Duration = Duration::from_millis(50);
/// Samples buffered between the reader thread and the engine
const SAMPLE_BUFFER: usize = 64;

type SampleFeed = mpsc::Receiver<Result<Sample>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Stdin,
    Ble,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "magnet-controller", version)]
#[command(about = "Turn a magnet held near a magnetometer into media and voice-assistant buttons")]
struct Cli {
    /// Settings file [default: <config dir>/magnet-controller/settings.json]
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Write the default settings file if there is none, then exit
    #[arg(long)]
    init: bool,
    #[arg(long, value_enum, default_value_t = SourceKind::Stdin)]
    source: SourceKind,
    /// Advertised name prefix of the BLE sensor
    #[arg(long, default_value = "magnet")]
    ble_name: String,
    /// UUID of the BLE field characteristic
    #[arg(long)]
    ble_char: Option<String>,
    /// Hotkey that zeroes the baseline (e.g. f9)
    #[arg(long)]
    zero_key: Option<String>,
    /// Hotkey that starts the voice assistant (e.g. f10)
    #[arg(long)]
    voice_key: Option<String>,
    /// Log actions instead of sending them to the host
    #[arg(long)]
    no_dispatch: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let store = cli
        .settings
        .clone()
        .map(JsonSettingsFile::new)
        .unwrap_or_default();

    if cli.init {
        if store.path().exists() {
            info!("Settings already exist at {}", store.path().display());
        } else {
            store.save(&Settings::default())
                .with_context(|| format!("Failed to write {}", store.path().display()))?;
        }
        return Ok(());
    }

    let settings = store.load()
        .with_context(|| format!("Failed to load settings from {}", store.path().display()))?;
    let config = ConfigHandle::new(settings.to_config());

    let notifier = Arc::new(LogHistory::new(ConsoleNotifier));
    let media: Box<dyn MediaKeys> = if cli.no_dispatch {
        Box::new(NullMediaKeys)
    } else {
        Box::new(CommandMediaKeys)
    };
    let chain = platform::build_chain(&settings.voice_chain, cli.no_dispatch);
    info!("Voice assistant chain: {}", chain.names().join(" -> "));
    let worker = DispatchWorker::spawn(ActionDispatcher::new(media, chain), notifier.clone())
        .context("Failed to start dispatch worker")?;

    let mut engine = MagnetEngine::with_config_handle(config.clone())
        .haptics(Box::new(BellHaptics))
        .sink(Box::new(worker))
        .notifier(notifier.clone())
        .build();

    watch_settings(store, config)?;

    #[cfg(feature = "desktop")]
    let hotkeys = start_hotkeys(&cli)?;
    #[cfg(not(feature = "desktop"))]
    if cli.zero_key.is_some() || cli.voice_key.is_some() {
        warn!("Hotkeys need the `desktop` feature; ignoring --zero-key/--voice-key");
    }

    let reader_cli = cli.clone();
    let samples = forward_samples(move || open_source(&reader_cli))?;
    notifier.log("controller ready");

    #[cfg(feature = "desktop")]
    let commands = || hotkeys.as_ref().and_then(|h| h.try_recv());
    #[cfg(not(feature = "desktop"))]
    let commands = || None::<ControlCommand>;

    run_loop(&mut engine, &samples, commands)?;

    info!("Sample stream ended");
    Ok(())
}

/// Feed samples to the engine and run manual commands as they come in.
///
/// Returns when the sample stream ends.
fn run_loop(
    engine: &mut MagnetEngine,
    samples: &SampleFeed,
    mut commands: impl FnMut() -> Option<ControlCommand>,
) -> Result<()> {
    loop {
        while let Some(command) = commands() {
            match command {
                ControlCommand::ZeroBaseline => {
                    engine.zero_baseline();
                }
                ControlCommand::TriggerVoice => {
                    engine.trigger_voice();
                }
            }
        }

        match samples.recv_timeout(COMMAND_POLL) {
            Ok(sample) => {
                engine.process(sample?);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}

/// Read samples on their own thread so a quiet source never holds up
/// manual commands.
fn forward_samples<F>(open: F) -> Result<SampleFeed>
where
    F: FnOnce() -> Result<Box<dyn SampleSource>> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(SAMPLE_BUFFER);
    std::thread::Builder::new()
        .name("magnet-source".into())
        .spawn(move || {
            let mut source = match open() {
                Ok(source) => source,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };
            loop {
                match source.next_sample() {
                    Ok(Some(sample)) => {
                        if tx.send(Ok(sample)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(anyhow::Error::new(e).context("Sample source failed")));
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn sample reader")?;
    Ok(rx)
}

fn open_source(cli: &Cli) -> Result<Box<dyn SampleSource>> {
    match cli.source {
        SourceKind::Stdin => {
            info!("Reading samples from stdin");
            Ok(Box::new(LineSource::stdin()))
        }
        #[cfg(feature = "ble")]
        SourceKind::Ble => {
            let uuid = cli.ble_char.as_deref().unwrap_or(ble::MAGNET_FIELD_CHAR_UUID);
            let uuid = uuid::Uuid::parse_str(uuid)
                .with_context(|| format!("Invalid characteristic UUID {}", uuid))?;
            Ok(Box::new(ble::BleSource::spawn(cli.ble_name.clone(), uuid)?))
        }
        #[cfg(not(feature = "ble"))]
        SourceKind::Ble => anyhow::bail!("Built without BLE support (enable the `ble` feature)"),
    }
}

#[cfg(feature = "desktop")]
fn start_hotkeys(cli: &Cli) -> Result<Option<magnet_controller::trigger::hotkey::ControlHotkeys>> {
    use magnet_controller::trigger::hotkey::{parse_key, ControlHotkeys};

    let parse = |name: &Option<String>| -> Result<_> {
        name.as_deref()
            .map(|n| parse_key(n).with_context(|| format!("Unknown hotkey '{}'", n)))
            .transpose()
    };
    let zero_key = parse(&cli.zero_key)?;
    let voice_key = parse(&cli.voice_key)?;
    if zero_key.is_none() && voice_key.is_none() {
        return Ok(None);
    }
    Ok(Some(ControlHotkeys::spawn(zero_key, voice_key)?))
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Poll the settings file and swap in a new configuration when it changes.
///
/// The voice chain is built once at start-up; only engine settings reload.
fn watch_settings(store: JsonSettingsFile, config: ConfigHandle) -> Result<()> {
    let mut last = modified(store.path());
    std::thread::Builder::new()
        .name("magnet-settings".into())
        .spawn(move || loop {
            std::thread::sleep(SETTINGS_POLL);
            let current = modified(store.path());
            if current == last {
                continue;
            }
            last = current;
            match store.load() {
                Ok(settings) => {
                    config.replace(settings.to_config());
                    info!("Settings reloaded from {}", store.path().display());
                }
                Err(e) => warn!("Keeping previous settings: {}", e),
            }
        })
        .context("Failed to spawn settings watcher")?;
    Ok(())
}
