//! Configuration file management for rid-sensor.
//!
//! Reads/writes `~/.rid-sensor/config.yaml` with scan schedule, track table,
//! alert and output settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;

use crate::alert::HEARTBEAT_INTERVAL;
use crate::schedule::{ChannelSchedule, DEFAULT_5GHZ_CHANNELS, DEFAULT_DWELL_MS, DEFAULT_FIXED_CHANNEL};
use crate::tracker::{OverflowPolicy, STALE_TIMEOUT};
use crate::types::RidError;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub scan: ScanConfig,
    pub tracks: TrackConfig,
    pub alert: AlertConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    #[default]
    DualBand,
    SingleBand,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::DualBand => "dual-band",
            ScanMode::SingleBand => "single-band",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dual-band" => Some(ScanMode::DualBand),
            "single-band" => Some(ScanMode::SingleBand),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub mode: ScanMode,
    pub fixed_channel: u8,
    pub channels_5ghz: Vec<u8>,
    pub dwell_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackConfig {
    pub overflow: OverflowPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    pub enabled: bool,
    pub heartbeat_secs: f64,
    pub stale_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub status_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan: ScanConfig {
                mode: ScanMode::DualBand,
                fixed_channel: DEFAULT_FIXED_CHANNEL,
                channels_5ghz: DEFAULT_5GHZ_CHANNELS.to_vec(),
                dwell_ms: DEFAULT_DWELL_MS,
            },
            tracks: TrackConfig {
                overflow: OverflowPolicy::OverwriteFirst,
            },
            alert: AlertConfig {
                enabled: true,
                heartbeat_secs: HEARTBEAT_INTERVAL,
                stale_secs: STALE_TIMEOUT,
            },
            output: OutputConfig { status_secs: 60 },
        }
    }
}

impl Config {
    /// Build the channel schedule this config describes.
    pub fn schedule(&self) -> ChannelSchedule {
        let dwell = Duration::from_millis(self.scan.dwell_ms);
        match self.scan.mode {
            ScanMode::DualBand => {
                ChannelSchedule::new(self.scan.fixed_channel, self.scan.channels_5ghz.clone(), dwell)
            }
            ScanMode::SingleBand => ChannelSchedule::single_band(self.scan.fixed_channel, dwell),
        }
    }
}

/// Get the config directory path (`~/.rid-sensor/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".rid-sensor")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.rid-sensor/config.yaml`.
///
/// Returns default config if file doesn't exist.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

/// Load config from an explicit path, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!("Cannot read {}: {e}; using defaults", path.display());
            return Config::default();
        }
    };

    parse_config(&text)
}

/// Save config to `~/.rid-sensor/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, RidError> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| RidError::Config(e.to_string()))?;

    let path = config_file();
    save_config_to(&path, config)?;
    Ok(path)
}

/// Save config to an explicit path.
pub fn save_config_to(path: &Path, config: &Config) -> Result<(), RidError> {
    let text = serialize_config(config);
    std::fs::write(path, text).map_err(|e| RidError::Config(e.to_string()))
}

/// Parse simple YAML-like config text. Unknown keys are ignored and bad
/// values keep their defaults.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = strip_comment(line).trim();
        if stripped.is_empty() {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = unquote(val.trim());

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }
        let Some(section) = current_section.as_deref() else {
            continue;
        };

        match (section, key) {
            ("scan", "mode") => set(&mut config.scan.mode, key, ScanMode::parse(val)),
            ("scan", "fixed_channel") => {
                set(&mut config.scan.fixed_channel, key, parse_channel(val))
            }
            ("scan", "channels_5ghz") => {
                set(&mut config.scan.channels_5ghz, key, parse_channel_list(val))
            }
            ("scan", "dwell_ms") => set(
                &mut config.scan.dwell_ms,
                key,
                val.parse().ok().filter(|&ms: &u64| ms > 0),
            ),
            ("tracks", "overflow") => {
                set(&mut config.tracks.overflow, key, OverflowPolicy::parse(val))
            }
            ("alert", "enabled") => set(&mut config.alert.enabled, key, parse_bool(val)),
            ("alert", "heartbeat_secs") => {
                set(&mut config.alert.heartbeat_secs, key, parse_secs(val))
            }
            ("alert", "stale_secs") => set(&mut config.alert.stale_secs, key, parse_secs(val)),
            ("output", "status_secs") => set(
                &mut config.output.status_secs,
                key,
                val.parse().ok().filter(|&s: &u64| s > 0),
            ),
            _ => {}
        }
    }

    config
}

fn set<T>(slot: &mut T, key: &str, parsed: Option<T>) {
    match parsed {
        Some(v) => *slot = v,
        None => warn!("Ignoring invalid config value for '{key}'"),
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_bool(val: &str) -> Option<bool> {
    match val {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_secs(val: &str) -> Option<f64> {
    val.parse::<f64>().ok().filter(|s| s.is_finite() && *s > 0.0)
}

fn parse_channel(val: &str) -> Option<u8> {
    val.parse::<u8>().ok().filter(|&c| c > 0)
}

/// Comma-separated channel list. An empty list is allowed (single-band).
fn parse_channel_list(val: &str) -> Option<Vec<u8>> {
    let val = val.trim_start_matches('[').trim_end_matches(']');
    if val.trim().is_empty() {
        return Some(Vec::new());
    }
    val.split(',').map(|c| parse_channel(c.trim())).collect()
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# rid-sensor configuration".to_string(), String::new()];

    let channels: Vec<String> = config.scan.channels_5ghz.iter().map(|c| c.to_string()).collect();
    lines.push("scan:".into());
    lines.push(format!("  mode: {}", config.scan.mode.as_str()));
    lines.push(format!("  fixed_channel: {}", config.scan.fixed_channel));
    lines.push(format!("  channels_5ghz: {}", channels.join(",")));
    lines.push(format!("  dwell_ms: {}", config.scan.dwell_ms));
    lines.push(String::new());

    lines.push("tracks:".into());
    lines.push(format!("  overflow: {}", config.tracks.overflow.as_str()));
    lines.push(String::new());

    lines.push("alert:".into());
    lines.push(format!("  enabled: {}", config.alert.enabled));
    lines.push(format!("  heartbeat_secs: {}", config.alert.heartbeat_secs));
    lines.push(format!("  stale_secs: {}", config.alert.stale_secs));
    lines.push(String::new());

    lines.push("output:".into());
    lines.push(format!("  status_secs: {}", config.output.status_secs));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scan.mode, ScanMode::DualBand);
        assert_eq!(config.scan.fixed_channel, 6);
        assert_eq!(config.scan.channels_5ghz, vec![149, 153, 157, 161, 165]);
        assert_eq!(config.scan.dwell_ms, 30);
        assert_eq!(config.tracks.overflow, OverflowPolicy::OverwriteFirst);
        assert!(config.alert.enabled);
        assert_eq!(config.alert.heartbeat_secs, 5.0);
        assert_eq!(config.alert.stale_secs, 7.0);
        assert_eq!(config.output.status_secs, 60);
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
scan:
  mode: single-band
  fixed_channel: 11
  channels_5ghz: 36, 40,44
  dwell_ms: 50

tracks:
  overflow: evict-oldest   # least recently seen

alert:
  enabled: false
  heartbeat_secs: 2.5
  stale_secs: 10

output:
  status_secs: 30
"#;
        let config = parse_config(text);
        assert_eq!(config.scan.mode, ScanMode::SingleBand);
        assert_eq!(config.scan.fixed_channel, 11);
        assert_eq!(config.scan.channels_5ghz, vec![36, 40, 44]);
        assert_eq!(config.scan.dwell_ms, 50);
        assert_eq!(config.tracks.overflow, OverflowPolicy::EvictOldest);
        assert!(!config.alert.enabled);
        assert_eq!(config.alert.heartbeat_secs, 2.5);
        assert_eq!(config.alert.stale_secs, 10.0);
        assert_eq!(config.output.status_secs, 30);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let text = r#"
scan:
  mode: tri-band
  fixed_channel: 300
  channels_5ghz: 149,abc
  dwell_ms: 0
alert:
  enabled: maybe
  stale_secs: -1
"#;
        let config = parse_config(text);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_quoted_values_and_unknown_keys() {
        let text = r#"
scan:
  mode: "single-band"
  antenna: external
logging:
  level: debug
"#;
        let config = parse_config(text);
        assert_eq!(config.scan.mode, ScanMode::SingleBand);
    }

    #[test]
    fn test_empty_channel_list() {
        let config = parse_config("scan:\n  channels_5ghz:  []\n");
        assert!(config.scan.channels_5ghz.is_empty());
        assert!(!config.schedule().is_hopping());
    }

    #[test]
    fn test_schedule_from_config() {
        let mut config = Config::default();
        assert_eq!(config.schedule().states_per_sweep(), 6);
        config.scan.mode = ScanMode::SingleBand;
        assert_eq!(config.schedule().states_per_sweep(), 1);
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.scan.channels_5ghz = vec![36, 149];
        config.scan.dwell_ms = 45;
        config.tracks.overflow = OverflowPolicy::EvictOldest;
        config.alert.enabled = false;
        config.alert.heartbeat_secs = 3.5;
        config.output.status_secs = 15;

        let text = serialize_config(&config);
        assert_eq!(parse_config(&text), config);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.scan.mode = ScanMode::SingleBand;
        save_config_to(&path, &config).unwrap();

        assert_eq!(load_config_from(&path), config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.yaml"));
        assert_eq!(config, Config::default());
    }
}
