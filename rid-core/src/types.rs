//! Shared types, error enums, and decoded OpenDroneID message types for rid-core.

use serde::Serialize;
use thiserror::Error;

/// All errors produced by rid-core outside the capture hot path.
#[derive(Debug, Error)]
pub enum RidError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),
    #[error("invalid capture record: {0}")]
    InvalidRecord(String),
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

/// Why a single message or message pack failed to decode.
///
/// Carries no heap data so it can be produced from capture context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated message: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("message type {actual:#x} where {expected:#x} was expected")]
    WrongType { expected: u8, actual: u8 },
    #[error("{0} outside encoding range")]
    OutOfRange(&'static str),
    #[error("{0} is not ASCII")]
    InvalidText(&'static str),
    #[error("bad message pack: {0}")]
    BadPack(&'static str),
}

// ---------------------------------------------------------------------------
// MAC address helpers
// ---------------------------------------------------------------------------

/// 6-byte transmitter MAC. Stored as raw bytes to keep the hot path allocation-free.
pub type Mac = [u8; 6];

/// The all-zero MAC marks a free TrackTable slot.
pub const UNSET_MAC: Mac = [0; 6];

/// Format a MAC as lowercase colon-separated hex (`aa:bb:cc:dd:ee:ff`).
pub fn mac_to_string(mac: &Mac) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated, any case) into a MAC.
pub fn mac_from_str(s: &str) -> Option<Mac> {
    let mut mac = [0u8; 6];
    let mut parts = s.trim().split([':', '-']);
    for byte in mac.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Encode bytes as lowercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Band / channel tagging
// ---------------------------------------------------------------------------

/// Radio band a detection was captured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    TwoPointFourGHz,
    #[serde(rename = "5GHz")]
    FiveGHz,
    #[serde(rename = "BLE")]
    Ble,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl Band {
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::TwoPointFourGHz => "2.4GHz",
            Band::FiveGHz => "5GHz",
            Band::Ble => "BLE",
            Band::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The WiFi channel the receiver is tuned to, as last published by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelBand {
    pub channel: u8,
    pub band: Band,
}

impl ChannelBand {
    pub const fn new(channel: u8, band: Band) -> Self {
        ChannelBand { channel, band }
    }

    /// Band for a WiFi channel number (1-14 are 2.4 GHz, everything above is 5 GHz).
    pub fn for_wifi_channel(channel: u8) -> Self {
        let band = match channel {
            1..=14 => Band::TwoPointFourGHz,
            32..=196 => Band::FiveGHz,
            _ => Band::Unknown,
        };
        ChannelBand { channel, band }
    }
}

// ---------------------------------------------------------------------------
// OpenDroneID constants
// ---------------------------------------------------------------------------

/// Every OpenDroneID message is exactly 25 bytes.
pub const ODID_MESSAGE_SIZE: usize = 25;

/// Maximum length of the UAS ID and operator ID strings.
pub const ODID_ID_SIZE: usize = 20;

/// Maximum number of messages a pack may carry.
pub const ODID_PACK_MAX_MESSAGES: usize = 9;

/// Fixed-capacity identifier string, so records can be merged without allocating.
pub type IdString = heapless::String<ODID_ID_SIZE>;

/// Message type from the high nibble of a message's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageType {
    BasicId,
    Location,
    Auth,
    SelfId,
    System,
    OperatorId,
    Pack,
    Reserved(u8),
}

impl MessageType {
    pub fn from_header(header: u8) -> Self {
        match header >> 4 {
            0x0 => MessageType::BasicId,
            0x1 => MessageType::Location,
            0x2 => MessageType::Auth,
            0x3 => MessageType::SelfId,
            0x4 => MessageType::System,
            0x5 => MessageType::OperatorId,
            0xF => MessageType::Pack,
            other => MessageType::Reserved(other),
        }
    }

    pub fn nibble(&self) -> u8 {
        match self {
            MessageType::BasicId => 0x0,
            MessageType::Location => 0x1,
            MessageType::Auth => 0x2,
            MessageType::SelfId => 0x3,
            MessageType::System => 0x4,
            MessageType::OperatorId => 0x5,
            MessageType::Pack => 0xF,
            MessageType::Reserved(n) => *n,
        }
    }
}

/// BasicID identifier type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdType {
    None,
    SerialNumber,
    CaaRegistration,
    UtmAssigned,
    SpecificSession,
    Other(u8),
}

impl IdType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => IdType::None,
            1 => IdType::SerialNumber,
            2 => IdType::CaaRegistration,
            3 => IdType::UtmAssigned,
            4 => IdType::SpecificSession,
            other => IdType::Other(other),
        }
    }

    pub fn to_u8(&self) -> u8 {
        match self {
            IdType::None => 0,
            IdType::SerialNumber => 1,
            IdType::CaaRegistration => 2,
            IdType::UtmAssigned => 3,
            IdType::SpecificSession => 4,
            IdType::Other(v) => *v,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded message types
// ---------------------------------------------------------------------------

/// Type 0x0: Basic ID.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicId {
    pub id_type: IdType,
    /// UA type (0 none, 2 helicopter/multirotor, ...), kept numeric.
    pub ua_type: u8,
    pub uas_id: IdString,
}

/// Type 0x1: Location / vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub status: u8,
    /// Degrees clockwise from true north; 361 when unknown.
    pub direction: f32,
    /// Metres per second; 255 when unknown.
    pub speed_horizontal: f32,
    pub speed_vertical: f32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_baro: f32,
    pub altitude_geo: f32,
    /// 0 = above takeoff, 1 = above ground.
    pub height_type: u8,
    pub height: f32,
    /// Seconds after the full hour, `None` when the transmitter sent "unknown".
    pub timestamp: Option<f32>,
}

/// Type 0x4: System (operator location, operating area, classification).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct System {
    pub operator_location_type: u8,
    pub classification_type: u8,
    pub operator_latitude: f64,
    pub operator_longitude: f64,
    pub area_count: u16,
    /// Metres.
    pub area_radius: u16,
    pub area_ceiling: f32,
    pub area_floor: f32,
    pub operator_altitude_geo: f32,
    /// Seconds since 2019-01-01T00:00:00Z.
    pub timestamp: u32,
}

/// Type 0x5: Operator ID.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorId {
    pub operator_id_type: u8,
    pub operator_id: IdString,
}

/// One decoded message of a supported type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OdidMessage {
    BasicId(BasicId),
    Location(Location),
    System(System),
    OperatorId(OperatorId),
}

impl OdidMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            OdidMessage::BasicId(_) => MessageType::BasicId,
            OdidMessage::Location(_) => MessageType::Location,
            OdidMessage::System(_) => MessageType::System,
            OdidMessage::OperatorId(_) => MessageType::OperatorId,
        }
    }
}

/// Everything one frame told us about an aircraft.
///
/// A frame carries either a single message (BLE legacy advertising) or a
/// pack; each slot holds the last message of that type seen in the frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UasData {
    pub basic_id: Option<BasicId>,
    pub location: Option<Location>,
    pub system: Option<System>,
    pub operator_id: Option<OperatorId>,
}

impl UasData {
    /// Store a decoded message in its slot.
    pub fn absorb(&mut self, msg: OdidMessage) {
        match msg {
            OdidMessage::BasicId(m) => self.basic_id = Some(m),
            OdidMessage::Location(m) => self.location = Some(m),
            OdidMessage::System(m) => self.system = Some(m),
            OdidMessage::OperatorId(m) => self.operator_id = Some(m),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.basic_id.is_none()
            && self.location.is_none()
            && self.system.is_none()
            && self.operator_id.is_none()
    }

    /// Iterate the populated slots as messages.
    pub fn messages(&self) -> impl Iterator<Item = OdidMessage> + '_ {
        let basic = self.basic_id.clone().map(OdidMessage::BasicId);
        let loc = self.location.clone().map(OdidMessage::Location);
        let sys = self.system.clone().map(OdidMessage::System);
        let op = self.operator_id.clone().map(OdidMessage::OperatorId);
        basic.into_iter().chain(loc).chain(sys).chain(op)
    }
}

/// A classified Remote ID frame, ready to merge into the TrackTable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub mac: Mac,
    pub rssi: i8,
    pub band: Band,
    pub channel: u8,
    pub data: UasData,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_roundtrip() {
        let mac = mac_from_str("AA:bb:cc:00:11:22").unwrap();
        assert_eq!(mac, [0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22]);
        assert_eq!(mac_to_string(&mac), "aa:bb:cc:00:11:22");
    }

    #[test]
    fn test_mac_from_str_rejects_garbage() {
        assert!(mac_from_str("aa:bb:cc:dd:ee").is_none());
        assert!(mac_from_str("aa:bb:cc:dd:ee:ff:00").is_none());
        assert!(mac_from_str("zz:bb:cc:dd:ee:ff").is_none());
        assert!(mac_from_str("aabb:cc:dd:ee:ff").is_none());
    }

    #[test]
    fn test_hex_decode() {
        assert_eq!(hex_decode("DD1e"), Some(vec![0xDD, 0x1E]));
        assert_eq!(hex_decode("odd"), None);
        assert_eq!(hex_decode("ZZZZ"), None);
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[0x90, 0x3A, 0xE6]), "903ae6");
    }

    #[test]
    fn test_band_for_channel() {
        assert_eq!(ChannelBand::for_wifi_channel(6).band, Band::TwoPointFourGHz);
        assert_eq!(ChannelBand::for_wifi_channel(161).band, Band::FiveGHz);
        assert_eq!(ChannelBand::for_wifi_channel(0).band, Band::Unknown);
    }

    #[test]
    fn test_band_labels() {
        assert_eq!(Band::FiveGHz.to_string(), "5GHz");
        assert_eq!(Band::Ble.as_str(), "BLE");
    }

    #[test]
    fn test_message_type_from_header() {
        assert_eq!(MessageType::from_header(0x02), MessageType::BasicId);
        assert_eq!(MessageType::from_header(0x12), MessageType::Location);
        assert_eq!(MessageType::from_header(0x42), MessageType::System);
        assert_eq!(MessageType::from_header(0x52), MessageType::OperatorId);
        assert_eq!(MessageType::from_header(0xF2), MessageType::Pack);
        assert_eq!(MessageType::from_header(0x72), MessageType::Reserved(7));
    }

    #[test]
    fn test_uas_data_absorb_keeps_last() {
        let mut data = UasData::default();
        assert!(data.is_empty());
        let mut id = IdString::new();
        id.push_str("OP1").unwrap();
        data.absorb(OdidMessage::OperatorId(OperatorId {
            operator_id_type: 0,
            operator_id: id.clone(),
        }));
        let mut id2 = IdString::new();
        id2.push_str("OP2").unwrap();
        data.absorb(OdidMessage::OperatorId(OperatorId {
            operator_id_type: 0,
            operator_id: id2,
        }));
        assert_eq!(data.operator_id.unwrap().operator_id.as_str(), "OP2");
    }
}
