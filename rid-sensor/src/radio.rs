//! Radio abstraction and the replay capture provider.
//!
//! A capture provider owns its own OS thread and delivers raw buffers to a
//! registered `CaptureHandler`. The only control surface is retuning the
//! WiFi receiver. On a host there is no promiscuous radio, so `ReplayRadio`
//! plays capture records back instead.

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, info};
use thiserror::Error;

use rid_core::schedule::DEFAULT_FIXED_CHANNEL;
use rid_core::types::{Band, ChannelBand, Mac};
use rid_feeder::capture::{CaptureKind, CaptureRecord};

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("channel {0} is not a valid WiFi channel")]
    InvalidChannel(u8),
    #[error("retune to channel {channel} failed: {reason}")]
    Retune { channel: u8, reason: String },
}

/// The receiver's control surface.
pub trait Radio: Send + Sync {
    fn set_wifi_channel(&self, channel: u8) -> Result<(), RadioError>;
}

/// Callbacks a capture provider invokes from its own thread.
///
/// Implementations must not block, allocate or log.
pub trait CaptureHandler: Send + Sync {
    fn on_wifi_management_frame(&self, raw: &[u8], rssi: i8);
    fn on_ble_advertisement(&self, mac: Mac, rssi: i8, payload: &[u8]);
}

// ---------------------------------------------------------------------------
// Replay radio
// ---------------------------------------------------------------------------

/// Radio backed by a capture file. Retuning only records the channel.
pub struct ReplayRadio {
    tuned: AtomicU8,
}

impl ReplayRadio {
    pub fn new() -> Self {
        ReplayRadio {
            tuned: AtomicU8::new(DEFAULT_FIXED_CHANNEL),
        }
    }

    pub fn tuned_channel(&self) -> u8 {
        self.tuned.load(Ordering::Relaxed)
    }
}

impl Default for ReplayRadio {
    fn default() -> Self {
        ReplayRadio::new()
    }
}

impl Radio for ReplayRadio {
    fn set_wifi_channel(&self, channel: u8) -> Result<(), RadioError> {
        if ChannelBand::for_wifi_channel(channel).band == Band::Unknown {
            return Err(RadioError::InvalidChannel(channel));
        }
        self.tuned.store(channel, Ordering::Relaxed);
        Ok(())
    }
}

/// Counters from one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub delivered: u64,
    /// WiFi records skipped because the radio was tuned elsewhere.
    pub off_channel: u64,
    pub read_errors: u64,
}

/// Deliver every record to `handler`.
///
/// With `realtime`, records are paced by their timestamps and a WiFi record
/// tagged with a channel is only heard while `radio` is tuned to it.
pub fn replay<I>(
    records: I,
    radio: &ReplayRadio,
    handler: &dyn CaptureHandler,
    realtime: bool,
) -> ReplayStats
where
    I: Iterator<Item = io::Result<CaptureRecord>>,
{
    let mut stats = ReplayStats::default();
    let start = Instant::now();
    let mut first_ts: Option<f64> = None;

    for record in records {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                debug!("Capture read error: {e}");
                stats.read_errors += 1;
                break;
            }
        };

        if realtime {
            let t0 = *first_ts.get_or_insert(record.timestamp);
            let offset = (record.timestamp - t0).max(0.0);
            if let Some(wait) = Duration::from_secs_f64(offset).checked_sub(start.elapsed()) {
                std::thread::sleep(wait);
            }
            if let Some(ch) = record.channel() {
                if ch != radio.tuned_channel() {
                    stats.off_channel += 1;
                    continue;
                }
            }
        }

        match &record.kind {
            CaptureKind::Wifi { rssi, frame, .. } => handler.on_wifi_management_frame(frame, *rssi),
            CaptureKind::Ble { mac, rssi, payload } => {
                handler.on_ble_advertisement(*mac, *rssi, payload)
            }
        }
        stats.delivered += 1;
    }

    stats
}

/// Run `replay` on a provider-owned thread.
pub fn spawn_replay<I>(
    records: I,
    radio: Arc<ReplayRadio>,
    handler: Arc<dyn CaptureHandler>,
    realtime: bool,
) -> io::Result<JoinHandle<ReplayStats>>
where
    I: Iterator<Item = io::Result<CaptureRecord>> + Send + 'static,
{
    std::thread::Builder::new()
        .name("capture-replay".into())
        .spawn(move || {
            let stats = replay(records, &radio, handler.as_ref(), realtime);
            info!(
                "Replay finished: {} delivered, {} off-channel",
                stats.delivered, stats.off_channel
            );
            stats
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
