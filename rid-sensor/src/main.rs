//! rid-sensor: Remote ID receiver pipeline.
//!
//! Supports:
//! - Running the full sensor (channel hopping, JSON events, alerts) on a replayed capture
//! - Decoding a capture file synchronously with a summary table
//! - Printing and saving the effective configuration

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, Table};
use log::{info, warn};
use tokio::sync::Mutex;

use rid_core::config::{self, Config, ScanMode};
use rid_core::frame::classify;
use rid_core::tracker::{DetectionRecord, TrackTable};
use rid_core::types::{mac_to_string, ChannelBand, Mac};
use rid_feeder::capture::FrameReader;

mod alert;
mod capture;
mod output;
mod pipeline;
mod radio;
mod scheduler;

use alert::{run_alert_task, AlertSink, ConsoleAlertSink};
use capture::Sensor;
use output::{event_line, run_consumer, run_status_task};
use radio::{spawn_replay, ReplayRadio};
use scheduler::run_channel_hopper;

#[derive(Parser)]
#[command(name = "rid-sensor", version, about = "Remote ID (ASTM F3411) drone sensor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Config file selection and command-line overrides.
#[derive(Args)]
struct Overrides {
    /// Config file (default ~/.rid-sensor/config.yaml)
    #[arg(long, env = "RID_SENSOR_CONFIG")]
    config: Option<PathBuf>,

    /// Stay on the fixed 2.4 GHz channel
    #[arg(long)]
    single_band: bool,

    /// Silence audible alerts (the indicator still flashes)
    #[arg(long)]
    mute: bool,

    /// Dwell time per channel in milliseconds
    #[arg(long)]
    dwell_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sensor on a replayed capture until Ctrl-C
    Run {
        /// Capture file (`-` for stdin)
        #[arg(long, default_value = "-")]
        capture: PathBuf,

        /// Pace records by their timestamps and only hear the tuned channel
        #[arg(long)]
        realtime: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Decode a capture file and print aircraft table
    Decode {
        /// Capture file (`-` for stdin)
        file: PathBuf,

        /// Show raw decoded messages instead of JSON events
        #[arg(short, long)]
        raw: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the effective configuration
    Config {
        /// Save it to the config file
        #[arg(long)]
        write: bool,

        #[command(flatten)]
        overrides: Overrides,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            capture,
            realtime,
            overrides,
        } => cmd_run(capture, realtime, overrides.apply()).await,
        Commands::Decode {
            file,
            raw,
            overrides,
        } => cmd_decode(file, raw, &overrides.apply()),
        Commands::Config { write, overrides } => {
            let path = overrides.config.clone();
            cmd_config(write, path.as_deref(), &overrides.apply())
        }
    }
}

impl Overrides {
    /// Load the config file and apply the flags on top.
    fn apply(&self) -> Config {
        let mut config = match &self.config {
            Some(path) => config::load_config_from(path),
            None => config::load_config(),
        };
        if self.single_band {
            config.scan.mode = ScanMode::SingleBand;
        }
        if self.mute {
            config.alert.enabled = false;
        }
        if let Some(ms) = self.dwell_ms {
            config.scan.dwell_ms = ms;
        }
        config
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(capture: PathBuf, realtime: bool, config: Config) -> Result<()> {
    let records = FrameReader::new(&capture)
        .records()
        .with_context(|| format!("opening {}", capture.display()))?;

    info!("Remote ID sensor starting");
    info!(
        "Scan: {}, overflow policy {}",
        config.scan.mode.as_str(),
        config.tracks.overflow.as_str()
    );

    let sensor = Arc::new(Sensor::new(&config));
    let radio = Arc::new(ReplayRadio::new());
    let stdout = Arc::new(Mutex::new(tokio::io::stdout()));

    let sink = Arc::new(ConsoleAlertSink::new(config.alert.enabled));
    sink.play_startup().await;

    tokio::spawn(run_channel_hopper(
        config.schedule(),
        radio.clone(),
        sensor.channel.clone(),
    ));
    let mut consumer = tokio::spawn(run_consumer(
        sensor.pipeline.clone(),
        sensor.table.clone(),
        stdout.clone(),
    ));
    let mut status = tokio::spawn(run_status_task(
        config.scan.mode,
        Duration::from_secs(config.output.status_secs),
        sensor.pipeline.clone(),
        stdout,
    ));
    tokio::spawn(run_alert_task(
        sensor.alerts.clone(),
        sensor.table.clone(),
        sink,
        sensor.clock,
    ));

    spawn_replay(records, radio, sensor.clone(), realtime).context("starting capture replay")?;
    info!(
        "Replaying {}{}",
        if capture.as_os_str() == "-" {
            "stdin".to_string()
        } else {
            capture.display().to_string()
        },
        if realtime { " in real time" } else { "" }
    );

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for Ctrl-C")?;
            info!("Shutting down");
        }
        res = &mut consumer => {
            res.context("consumer task")?.context("writing events")?;
        }
        res = &mut status => {
            res.context("status task")?.context("writing status")?;
        }
    }

    let (upserts, overwrites) = sensor.table.with(|t| (t.total_upserts, t.overwrites));
    info!(
        "{} detections, {} tracked, {} slot overwrites",
        upserts,
        sensor.table.len(),
        overwrites
    );
    info!(
        "{} events written, {} dropped",
        sensor.pipeline.sent(),
        sensor.pipeline.dropped()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

fn cmd_decode(file: PathBuf, raw: bool, config: &Config) -> Result<()> {
    let reader = FrameReader::new(&file);
    let mut records = reader
        .records()
        .with_context(|| format!("opening {}", file.display()))?;

    let mut table = TrackTable::new(config.tracks.overflow);
    let mut counts: HashMap<Mac, u32> = HashMap::new();
    let mut total = 0u64;
    let mut detected = 0u64;

    for record in records.by_ref() {
        let record = record?;
        total += 1;

        let channel = ChannelBand::for_wifi_channel(record.channel().unwrap_or(0));
        let Some(det) = classify(record.bytes(), record.source(), channel) else {
            continue;
        };
        detected += 1;
        *counts.entry(det.mac).or_default() += 1;

        if raw {
            for msg in det.data.messages() {
                println!("{msg:?}");
            }
        }

        let rec = table.upsert(&det, record.timestamp);
        if !raw {
            println!("{}", event_line(&rec)?);
        }
        table.mark_read(&rec.mac);
    }

    if records.skipped > 0 {
        warn!("{} malformed lines skipped", records.skipped);
    }
    let tracked: Vec<DetectionRecord> = table.iter().cloned().collect();
    print_summary(&tracked, &counts, total, detected, table.overwrites);
    Ok(())
}

fn print_summary(
    tracked: &[DetectionRecord],
    counts: &HashMap<Mac, u32>,
    total: u64,
    detected: u64,
    overwrites: u64,
) {
    eprintln!();
    eprintln!(
        "Records: {total} read, {detected} Remote ID, {} aircraft tracked, {overwrites} overwritten",
        tracked.len()
    );
    eprintln!();

    if tracked.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "MAC", "Basic ID", "Operator", "Band", "Ch", "RSSI", "Alt (m)", "Speed", "Hdg", "Lat",
        "Lon", "Pilot", "Msgs",
    ]);

    let mut sorted: Vec<_> = tracked.iter().collect();
    sorted.sort_by_key(|r| std::cmp::Reverse(counts.get(&r.mac).copied().unwrap_or(0)));

    let dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };

    for rec in sorted {
        let positioned = rec.has_position();
        table.add_row(vec![
            Cell::new(mac_to_string(&rec.mac)),
            Cell::new(dash(rec.uav_id.as_str())),
            Cell::new(dash(rec.operator_id.as_str())),
            Cell::new(rec.band),
            Cell::new(if rec.channel == 0 {
                "-".to_string()
            } else {
                rec.channel.to_string()
            }),
            Cell::new(rec.rssi),
            Cell::new(if positioned {
                rec.altitude_msl.to_string()
            } else {
                "-".into()
            }),
            Cell::new(if positioned {
                rec.speed_horizontal.to_string()
            } else {
                "-".into()
            }),
            Cell::new(if positioned {
                rec.heading.to_string()
            } else {
                "-".into()
            }),
            Cell::new(if positioned {
                format!("{:.6}", rec.drone_lat)
            } else {
                "-".into()
            }),
            Cell::new(if positioned {
                format!("{:.6}", rec.drone_lon)
            } else {
                "-".into()
            }),
            Cell::new(if rec.pilot_lat != 0.0 || rec.pilot_lon != 0.0 {
                format!("{:.4}, {:.4}", rec.pilot_lat, rec.pilot_lon)
            } else {
                "-".into()
            }),
            Cell::new(counts.get(&rec.mac).copied().unwrap_or(0)),
        ]);
    }

    eprintln!("{table}");
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config(write: bool, path: Option<&Path>, config: &Config) -> Result<()> {
    print!("{}", config::serialize_config(config));
    if write {
        let saved = match path {
            Some(p) => {
                config::save_config_to(p, config)?;
                p.to_path_buf()
            }
            None => config::save_config(config)?,
        };
        eprintln!("Saved to {}", saved.display());
    }
    Ok(())
}
