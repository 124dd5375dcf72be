//! Capture-record file I/O.
//!
//! One captured buffer per line:
//! - `<t> wifi <rssi> <hex frame> [ch=<n>]`
//! - `<t> ble <aa:bb:cc:dd:ee:ff> <rssi> <hex payload>`
//!
//! `#` comments and blank lines are ignored. `t` is seconds relative to the
//! start of the capture and is only used to pace replay.

use std::fmt;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::warn;

use rid_core::frame::CaptureSource;
use rid_core::types::{hex_decode, hex_encode, mac_from_str, mac_to_string, Mac, RidError};

// ---------------------------------------------------------------------------
// Capture record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureKind {
    /// 802.11 management frame from promiscuous capture.
    Wifi {
        rssi: i8,
        frame: Vec<u8>,
        /// Channel the frame was transmitted on, when known.
        channel: Option<u8>,
    },
    /// BLE advertising payload with the advertiser address.
    Ble { mac: Mac, rssi: i8, payload: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    pub timestamp: f64,
    pub kind: CaptureKind,
}

impl CaptureRecord {
    pub fn wifi(timestamp: f64, rssi: i8, frame: Vec<u8>, channel: Option<u8>) -> Self {
        CaptureRecord {
            timestamp,
            kind: CaptureKind::Wifi {
                rssi,
                frame,
                channel,
            },
        }
    }

    pub fn ble(timestamp: f64, mac: Mac, rssi: i8, payload: Vec<u8>) -> Self {
        CaptureRecord {
            timestamp,
            kind: CaptureKind::Ble { mac, rssi, payload },
        }
    }

    /// The raw captured bytes.
    pub fn bytes(&self) -> &[u8] {
        match &self.kind {
            CaptureKind::Wifi { frame, .. } => frame,
            CaptureKind::Ble { payload, .. } => payload,
        }
    }

    /// How the classifier should interpret `bytes()`.
    pub fn source(&self) -> CaptureSource {
        match &self.kind {
            CaptureKind::Wifi { rssi, .. } => CaptureSource::WifiMgmt { rssi: *rssi },
            CaptureKind::Ble { mac, rssi, .. } => CaptureSource::Ble {
                mac: *mac,
                rssi: *rssi,
            },
        }
    }

    pub fn channel(&self) -> Option<u8> {
        match &self.kind {
            CaptureKind::Wifi { channel, .. } => *channel,
            CaptureKind::Ble { .. } => None,
        }
    }

    pub fn is_ble(&self) -> bool {
        matches!(self.kind, CaptureKind::Ble { .. })
    }
}

impl fmt::Display for CaptureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CaptureKind::Wifi {
                rssi,
                frame,
                channel,
            } => {
                write!(f, "{:.3} wifi {} {}", self.timestamp, rssi, hex_encode(frame))?;
                if let Some(ch) = channel {
                    write!(f, " ch={ch}")?;
                }
                Ok(())
            }
            CaptureKind::Ble { mac, rssi, payload } => write!(
                f,
                "{:.3} ble {} {} {}",
                self.timestamp,
                mac_to_string(mac),
                rssi,
                hex_encode(payload)
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Strip whitespace and comments. `None` for lines with nothing to parse.
pub fn clean_capture_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line)
}

/// Parse one capture record line.
pub fn parse_capture_line(line: &str) -> Result<CaptureRecord, RidError> {
    let bad = |why: &str| RidError::InvalidRecord(format!("{why}: {line}"));
    let mut fields = line.split_whitespace();

    let timestamp: f64 = fields
        .next()
        .and_then(|t| t.parse().ok())
        .filter(|t: &f64| t.is_finite())
        .ok_or_else(|| bad("bad timestamp"))?;

    let record = match fields.next() {
        Some("wifi") => {
            let rssi = parse_rssi(fields.next()).ok_or_else(|| bad("bad rssi"))?;
            let hex = fields.next().ok_or_else(|| bad("missing frame"))?;
            let frame = hex_decode(hex).ok_or_else(|| RidError::InvalidHex(hex.to_string()))?;
            let channel = match fields.next() {
                Some(tok) => Some(
                    tok.strip_prefix("ch=")
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(|| bad("bad channel"))?,
                ),
                None => None,
            };
            CaptureRecord::wifi(timestamp, rssi, frame, channel)
        }
        Some("ble") => {
            let mac_str = fields.next().ok_or_else(|| bad("missing address"))?;
            let mac = mac_from_str(mac_str).ok_or_else(|| RidError::InvalidMac(mac_str.to_string()))?;
            let rssi = parse_rssi(fields.next()).ok_or_else(|| bad("bad rssi"))?;
            let hex = fields.next().ok_or_else(|| bad("missing payload"))?;
            let payload = hex_decode(hex).ok_or_else(|| RidError::InvalidHex(hex.to_string()))?;
            CaptureRecord::ble(timestamp, mac, rssi, payload)
        }
        _ => return Err(bad("unknown record kind")),
    };

    if fields.next().is_some() {
        return Err(bad("trailing fields"));
    }
    Ok(record)
}

fn parse_rssi(field: Option<&str>) -> Option<i8> {
    field?.parse().ok()
}

// ---------------------------------------------------------------------------
// Readers and writers
// ---------------------------------------------------------------------------

/// Iterator over the records of a line source. Malformed lines are logged
/// and skipped.
pub struct CaptureLines<R> {
    reader: R,
    line_no: usize,
    buf: String,
    pub skipped: usize,
}

impl<R: BufRead> CaptureLines<R> {
    pub fn new(reader: R) -> Self {
        CaptureLines {
            reader,
            line_no: 0,
            buf: String::new(),
            skipped: 0,
        }
    }
}

impl<R: BufRead> Iterator for CaptureLines<R> {
    type Item = io::Result<CaptureRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
            self.line_no += 1;

            let Some(line) = clean_capture_line(&self.buf) else {
                continue;
            };
            match parse_capture_line(line) {
                Ok(record) => return Some(Ok(record)),
                Err(e) => {
                    warn!("line {}: {e}", self.line_no);
                    self.skipped += 1;
                }
            }
        }
    }
}

/// Read capture records from a file, or stdin for `-`.
pub struct FrameReader {
    path: PathBuf,
}

impl FrameReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FrameReader {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn is_stdin(&self) -> bool {
        self.path.as_os_str() == "-"
    }

    /// Streaming iterator over the records.
    pub fn records(&self) -> io::Result<CaptureLines<Box<dyn BufRead + Send>>> {
        let reader: Box<dyn BufRead + Send> = if self.is_stdin() {
            Box::new(BufReader::new(io::stdin()))
        } else {
            Box::new(BufReader::new(fs::File::open(&self.path)?))
        };
        Ok(CaptureLines::new(reader))
    }

    /// Read all records.
    pub fn read_all(&self) -> io::Result<Vec<CaptureRecord>> {
        self.records()?.collect()
    }
}

/// Write capture records one per line.
pub struct CaptureWriter<W: Write> {
    out: W,
    pub written: u64,
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(out: W) -> Self {
        CaptureWriter { out, written: 0 }
    }

    pub fn comment(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "# {text}")
    }

    pub fn write(&mut self, record: &CaptureRecord) -> io::Result<()> {
        writeln!(self.out, "{record}")?;
        self.written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
