//! rid-feeder: Remote ID capture tooling.
//!
//! Supports:
//! - Generating synthetic Remote ID broadcasts as capture records
//! - Inspecting capture files (classify + decode every record)

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use rid_core::frame::classify_with_carrier;
use rid_core::types::{mac_to_string, ChannelBand};
use rid_feeder::capture::{CaptureWriter, FrameReader};
use rid_feeder::simulate::{Carrier, Simulator, TxBand, DEFAULT_RATE_HZ};

#[derive(Parser)]
#[command(
    name = "rid-feeder",
    version,
    about = "Remote ID capture files and test transmitter"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit capture records for a simulated aircraft flying a circle
    Simulate {
        /// Seconds of flight to generate
        #[arg(long, default_value = "60")]
        duration: f64,

        /// Broadcasts per second
        #[arg(long, default_value_t = DEFAULT_RATE_HZ)]
        rate: f64,

        /// Broadcast carrier: nan, beacon or ble
        #[arg(long, default_value = "nan")]
        carrier: Carrier,

        /// WiFi band: 5 (rotate UNII-3 channels) or 2.4
        #[arg(long, default_value = "5")]
        band: TxBand,

        /// RNG seed for a reproducible identity
        #[arg(long)]
        seed: Option<u64>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit records in real time instead of all at once
        #[arg(long)]
        realtime: bool,
    },

    /// Classify and decode every record in a capture file
    Inspect {
        /// Capture file (`-` for stdin)
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            duration,
            rate,
            carrier,
            band,
            seed,
            output,
            realtime,
        } => cmd_simulate(duration, rate, carrier, band, seed, output, realtime),
        Commands::Inspect { file } => cmd_inspect(file),
    }
}

fn cmd_simulate(
    duration: f64,
    rate: f64,
    carrier: Carrier,
    band: TxBand,
    seed: Option<u64>,
    output: Option<PathBuf>,
    realtime: bool,
) -> Result<()> {
    if !(rate > 0.0 && rate.is_finite()) {
        bail!("--rate must be positive");
    }
    if !(duration >= 0.0 && duration.is_finite()) {
        bail!("--duration must be non-negative");
    }

    let out: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = CaptureWriter::new(out);

    let mut sim = Simulator::new(carrier, band, seed);
    let id = &sim.identity;
    info!("Serial: {}", id.serial);
    info!("Operator: {}", id.operator);
    info!("Home: {:.6}, {:.6}", id.home_lat, id.home_lon);
    info!("MAC: {}", mac_to_string(&id.mac));
    info!("Carrier: {carrier}, {rate} Hz for {duration}s");

    writer.comment(&format!(
        "rid-feeder simulate carrier={carrier} serial={} mac={}",
        id.serial,
        mac_to_string(&id.mac)
    ))?;

    let interval = 1.0 / rate;
    let count = (duration * rate).floor() as u64;
    let start = Instant::now();
    for i in 0..count {
        let elapsed = i as f64 * interval;
        if realtime {
            let target = Duration::from_secs_f64(elapsed);
            if let Some(wait) = target.checked_sub(start.elapsed()) {
                std::thread::sleep(wait);
            }
        }
        writer.write(&sim.broadcast(elapsed))?;
        if realtime {
            writer.flush()?;
        }
    }
    writer.flush()?;

    info!("{} records written", writer.written);
    Ok(())
}

fn cmd_inspect(file: PathBuf) -> Result<()> {
    let reader = FrameReader::new(&file);
    let mut records = reader
        .records()
        .with_context(|| format!("opening {}", file.display()))?;

    let mut total = 0u64;
    let mut detected = 0u64;
    for record in records.by_ref() {
        let record = record?;
        total += 1;

        let channel = ChannelBand::for_wifi_channel(record.channel().unwrap_or(0));
        let Some((carrier, det)) = classify_with_carrier(record.bytes(), record.source(), channel)
        else {
            continue;
        };
        detected += 1;

        println!(
            "{:.3} {} {} rssi={} {}",
            record.timestamp,
            carrier.as_str(),
            mac_to_string(&det.mac),
            det.rssi,
            det.band
        );
        let mut empty = true;
        for msg in det.data.messages() {
            println!("  {:?}", msg);
            empty = false;
        }
        if empty {
            println!("  (no supported messages)");
        }
    }

    eprintln!(
        "{total} records, {detected} Remote ID, {} malformed lines skipped",
        records.skipped
    );
    Ok(())
}
