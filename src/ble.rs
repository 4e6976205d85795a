/*
 * BLE magnetometer source - connect to a sensor tag and stream field readings via GATT
 * Uses btleplug for BLE connectivity
 */

use anyhow::{Context, Result};
use btleplug::api::{Central as _, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};
use magnet_controller::{Sample, SampleSource};
use std::pin::Pin;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use uuid::Uuid;

const SCAN_TIMEOUT: Duration = Duration::from_secs(30);
const SCAN_POLL: Duration = Duration::from_secs(2);
/// Readings buffered between the BLE task and the sample loop
const CHANNEL_DEPTH: usize = 64;

// Magnetometer field characteristic (sensor firmware):
// notifies x, y, z as f32 µT (12 bytes) or i16 in 0.1 µT steps (6 bytes)
pub const MAGNET_FIELD_CHAR_UUID: &str = "6D41A001-5A3C-4F6B-9E2D-7C1B0E4F8A10";
const RAW_LSB_UT: f32 = 0.1;

/// Decode one field notification into µT.
pub fn decode_field(payload: &[u8]) -> Option<[f32; 3]> {
    match payload.len() {
        12 => {
            let mut axes = [0.0f32; 3];
            for (axis, chunk) in axes.iter_mut().zip(payload.chunks_exact(4)) {
                *axis = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
            axes.iter().all(|a| a.is_finite()).then_some(axes)
        }
        6 => {
            let mut axes = [0.0f32; 3];
            for (axis, chunk) in axes.iter_mut().zip(payload.chunks_exact(2)) {
                *axis = i16::from_le_bytes([chunk[0], chunk[1]]) as f32 * RAW_LSB_UT;
            }
            Some(axes)
        }
        _ => None,
    }
}

pub struct BleMagnetometer {
    name_prefix: String,
    field_uuid: Uuid,
    periph: Option<Peripheral>,
    char_field: Option<Characteristic>,
}

impl BleMagnetometer {
    pub fn new(name_prefix: impl Into<String>, field_uuid: Uuid) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            field_uuid,
            periph: None,
            char_field: None,
        }
    }

    /// Scan for the sensor, connect and subscribe to field notifications
    pub async fn connect(&mut self) -> Result<()> {
        info!("Scanning for magnetometer (pattern: {}*)", self.name_prefix);

        let manager = Manager::new().await
            .context("Failed to create BLE manager")?;

        let adapter: Adapter = manager.adapters().await
            .context("Failed to get adapters")?
            .into_iter()
            .next()
            .context("No BLE adapter found")?;

        adapter.start_scan(ScanFilter::default()).await
            .context("Failed to start scan")?;

        let prefix = self.name_prefix.clone();
        let scan_future = async {
            loop {
                tokio::time::sleep(SCAN_POLL).await;

                let peripherals = adapter.peripherals().await?;
                debug!("Discovered {} peripherals", peripherals.len());

                for p in peripherals {
                    let Some(props) = p.properties().await? else {
                        continue;
                    };
                    if let Some(local_name) = &props.local_name {
                        debug!("Found device: {}", local_name);
                        if local_name.starts_with(&prefix) {
                            info!("Found target device: {}", local_name);
                            return Ok::<Peripheral, btleplug::Error>(p);
                        }
                    }
                }
            }
        };

        let found = timeout(SCAN_TIMEOUT, scan_future).await;
        adapter.stop_scan().await.ok();
        let periph = found
            .context("Scan timeout, device not found")?
            .context("Scan failed")?;

        info!("Connecting to device...");
        periph.connect().await
            .context("Failed to connect to device")?;

        info!("Connected! Discovering services...");
        periph.discover_services().await
            .context("Failed to discover services")?;

        let services = periph.services();
        info!("Discovered {} services", services.len());
        self.char_field = services
            .iter()
            .flat_map(|service| service.characteristics.iter())
            .find(|c| c.uuid == self.field_uuid)
            .cloned();

        let Some(ref char) = self.char_field else {
            error!("Field characteristic {} not found. Available services:", self.field_uuid);
            for service in &services {
                error!("  - {}", service.uuid);
            }
            anyhow::bail!("Magnetometer field characteristic not found");
        };

        periph.subscribe(char).await
            .context("Failed to subscribe to field notifications")?;
        info!("Subscribed to field notifications");

        self.periph = Some(periph);
        Ok(())
    }

    /// Get the notification stream - call this once and then poll it
    pub async fn notifications(&self) -> Result<Pin<Box<dyn Stream<Item = ValueNotification> + Send>>> {
        match self.periph {
            Some(ref periph) => periph.notifications().await
                .context("Failed to get notification stream"),
            None => anyhow::bail!("Not connected"),
        }
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(periph) = self.periph.take() {
            info!("Disconnecting from device");
            self.char_field = None;
            periph.disconnect().await
                .context("Failed to disconnect")?;
        }
        Ok(())
    }
}

impl Drop for BleMagnetometer {
    fn drop(&mut self) {
        if self.periph.is_some() {
            warn!("BleMagnetometer dropped without explicit disconnect");
        }
    }
}

type Reading = std::result::Result<[f32; 3], String>;

/// [`SampleSource`] fed by a BLE task on its own runtime thread.
///
/// Readings are stamped on arrival. When the sample loop falls behind, new
/// readings are dropped rather than queued without bound.
pub struct BleSource {
    rx: mpsc::Receiver<Reading>,
    opened: Instant,
}

impl BleSource {
    pub fn spawn(name_prefix: String, field_uuid: Uuid) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<Reading>(CHANNEL_DEPTH);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start BLE runtime")?;

        std::thread::Builder::new()
            .name("magnet-ble".into())
            .spawn(move || runtime.block_on(stream_readings(name_prefix, field_uuid, tx)))
            .context("Failed to spawn BLE thread")?;

        Ok(Self {
            rx,
            opened: Instant::now(),
        })
    }
}

async fn stream_readings(name_prefix: String, field_uuid: Uuid, tx: mpsc::SyncSender<Reading>) {
    let mut device = BleMagnetometer::new(name_prefix, field_uuid);
    if let Err(e) = device.connect().await {
        let _ = tx.send(Err(format!("{:#}", e)));
        return;
    }
    let mut stream = match device.notifications().await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx.send(Err(format!("{:#}", e)));
            let _ = device.disconnect().await;
            return;
        }
    };

    while let Some(notification) = stream.next().await {
        if notification.uuid != field_uuid {
            continue;
        }
        let Some(axes) = decode_field(&notification.value) else {
            warn!("Ignoring {} byte field notification", notification.value.len());
            continue;
        };
        match tx.try_send(Ok(axes)) {
            Ok(()) => {}
            Err(mpsc::TrySendError::Full(_)) => debug!("Sample loop busy, dropping reading"),
            Err(mpsc::TrySendError::Disconnected(_)) => break,
        }
    }

    info!("Field notifications ended");
    if let Err(e) = device.disconnect().await {
        warn!("{:#}", e);
    }
}

impl SampleSource for BleSource {
    fn next_sample(&mut self) -> magnet_controller::Result<Option<Sample>> {
        match self.rx.recv() {
            Ok(Ok([x, y, z])) => {
                let t = self.opened.elapsed().as_millis() as u64;
                Ok(Some(Sample::new(x, y, z, t)))
            }
            Ok(Err(msg)) => Err(magnet_controller::Error::Source(msg)),
            Err(_) => Ok(None),
        }
    }
}
