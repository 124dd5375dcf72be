//! JSON line output: detection events and the periodic status line.
//!
//! The consumer task drains the event pipeline and writes one object per
//! line. Stdout is shared with the status task behind an async mutex so
//! lines never interleave.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use rid_core::config::ScanMode;
use rid_core::tracker::{DetectionRecord, SharedTrackTable};
use rid_core::types::{mac_to_string, Band};

use crate::pipeline::EventPipeline;

/// One detection, in output field order.
#[derive(Debug, Serialize)]
pub struct EventLine<'a> {
    pub mac: String,
    pub rssi: i8,
    pub band: Band,
    pub channel: u8,
    pub drone_lat: Box<RawValue>,
    pub drone_long: Box<RawValue>,
    pub drone_altitude: i32,
    pub pilot_lat: Box<RawValue>,
    pub pilot_long: Box<RawValue>,
    pub basic_id: &'a str,
}

#[derive(Debug, Serialize)]
struct StatusLine {
    status: &'static str,
    mode: &'static str,
    bands: &'static [&'static str],
}

/// Coordinate with exactly six decimals, as a bare JSON number.
fn coordinate(v: f64) -> serde_json::Result<Box<RawValue>> {
    let v = if v.is_finite() { v } else { 0.0 };
    RawValue::from_string(format!("{v:.6}"))
}

impl<'a> EventLine<'a> {
    pub fn from_record(record: &'a DetectionRecord) -> serde_json::Result<Self> {
        Ok(EventLine {
            mac: mac_to_string(&record.mac),
            rssi: record.rssi,
            band: record.band,
            channel: record.channel,
            drone_lat: coordinate(record.drone_lat)?,
            drone_long: coordinate(record.drone_lon)?,
            drone_altitude: record.altitude_msl,
            pilot_lat: coordinate(record.pilot_lat)?,
            pilot_long: coordinate(record.pilot_lon)?,
            basic_id: record.uav_id.as_str(),
        })
    }
}

/// Serialize one record as a JSON line (without the newline).
pub fn event_line(record: &DetectionRecord) -> serde_json::Result<String> {
    serde_json::to_string(&EventLine::from_record(record)?)
}

pub fn status_line(mode: ScanMode) -> serde_json::Result<String> {
    let bands: &'static [&'static str] = match mode {
        ScanMode::DualBand => &["2.4GHz", "5GHz", "BLE"],
        ScanMode::SingleBand => &["2.4GHz", "BLE"],
    };
    serde_json::to_string(&StatusLine {
        status: "active",
        mode: mode.as_str(),
        bands,
    })
}

async fn write_line<W>(out: &Mutex<W>, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut out = out.lock().await;
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Drain the pipeline forever. Returns only when the sink fails.
pub async fn run_consumer<W>(
    pipeline: Arc<EventPipeline>,
    table: Arc<SharedTrackTable>,
    out: Arc<Mutex<W>>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let record = pipeline.recv().await;
        let line = match event_line(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping event for {}: {e}", mac_to_string(&record.mac));
                continue;
            }
        };
        write_line(&out, &line).await?;
        table.mark_read(&record.mac);
    }
}

/// Emit the status line every `period`, and report queue drops since the last one.
pub async fn run_status_task<W>(
    mode: ScanMode,
    period: Duration,
    pipeline: Arc<EventPipeline>,
    out: Arc<Mutex<W>>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let period = period.max(Duration::from_secs(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut last_dropped = 0u64;
    let line = status_line(mode).map_err(std::io::Error::other)?;

    loop {
        interval.tick().await;
        write_line(&out, &line).await?;

        let dropped = pipeline.dropped();
        if dropped > last_dropped {
            warn!(
                "Event queue full: {} notifications dropped ({} total)",
                dropped - last_dropped,
                dropped
            );
            last_dropped = dropped;
        } else {
            debug!("{} events sent, none dropped", pipeline.sent());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
