//! Decode OpenDroneID (ASTM F3411) messages and message packs.
//!
//! Supported message types:
//! - 0x0 Basic ID:    ID type, UA type, UAS ID (serial / registration)
//! - 0x1 Location:    lat/lon, altitudes, height, speed, direction, status
//! - 0x4 System:      operator location, operating area, classification
//! - 0x5 Operator ID: operator registration string
//! - 0xF Pack:        up to 9 of the above in one buffer
//!
//! Auth (0x2), Self ID (0x3) and reserved types decode to `Ok(None)`.
//!
//! Every function here is pure and allocation-free so it can run from a
//! capture callback.

use crate::types::*;

// Decoding constants from the standard.
const LATLON_MULT: f64 = 1e-7;
const SPEED_DIV: [f32; 2] = [0.25, 0.75];
const VSPEED_DIV: f32 = 0.5;
const ALT_OFFSET: f32 = 1000.0;
const ALT_DIV: f32 = 0.5;
const TIMESTAMP_UNKNOWN: u16 = 0xFFFF;
const TIMESTAMP_MAX: u16 = 36000;
const AREA_RADIUS_MULT: u16 = 10;

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Check length and message type of a single 25-byte message.
fn check_message(msg: &[u8], expected: MessageType) -> Result<(), DecodeError> {
    if msg.len() < ODID_MESSAGE_SIZE {
        return Err(DecodeError::Truncated {
            needed: ODID_MESSAGE_SIZE,
            actual: msg.len(),
        });
    }
    let actual = MessageType::from_header(msg[0]);
    if actual != expected {
        return Err(DecodeError::WrongType {
            expected: expected.nibble(),
            actual: actual.nibble(),
        });
    }
    Ok(())
}

/// Altitude: 0.5 m resolution with a -1000 m offset.
pub fn decode_altitude(raw: u16) -> f32 {
    raw as f32 * ALT_DIV - ALT_OFFSET
}

/// Horizontal speed: 0.25 m/s steps, or 0.75 m/s steps above 63.75 m/s.
pub fn decode_speed_horizontal(raw: u8, multiplier: bool) -> f32 {
    if multiplier {
        raw as f32 * SPEED_DIV[1] + 255.0 * SPEED_DIV[0]
    } else {
        raw as f32 * SPEED_DIV[0]
    }
}

/// Track direction: 0-179 plus 180 when the east/west bit is set.
pub fn decode_direction(raw: u8, east_west: bool) -> f32 {
    if east_west {
        raw as f32 + 180.0
    } else {
        raw as f32
    }
}

fn decode_lat_lon(raw: i32, limit: f64, field: &'static str) -> Result<f64, DecodeError> {
    let deg = raw as f64 * LATLON_MULT;
    if deg.abs() > limit {
        return Err(DecodeError::OutOfRange(field));
    }
    Ok(deg)
}

/// NUL-padded ASCII identifier field.
fn decode_id_string(raw: &[u8], field: &'static str) -> Result<IdString, DecodeError> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let bytes = &raw[..end.min(ODID_ID_SIZE)];
    if !bytes.is_ascii() {
        return Err(DecodeError::InvalidText(field));
    }
    let mut out = IdString::new();
    for &b in bytes {
        // Cannot overflow: at most ODID_ID_SIZE ASCII bytes.
        let _ = out.push(b as char);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Per-type decoders
// ---------------------------------------------------------------------------

/// Decode message type 0x0: Basic ID.
pub fn decode_basic_id(msg: &[u8]) -> Result<BasicId, DecodeError> {
    check_message(msg, MessageType::BasicId)?;
    Ok(BasicId {
        id_type: IdType::from_u8(msg[1] >> 4),
        ua_type: msg[1] & 0x0F,
        uas_id: decode_id_string(&msg[2..2 + ODID_ID_SIZE], "UAS ID")?,
    })
}

/// Decode message type 0x1: Location / vector.
pub fn decode_location(msg: &[u8]) -> Result<Location, DecodeError> {
    check_message(msg, MessageType::Location)?;

    let flags = msg[1];
    let status = flags >> 4;
    let height_type = (flags >> 2) & 0x01;
    let east_west = (flags >> 1) & 0x01 == 1;
    let speed_mult = flags & 0x01 == 1;

    let direction_raw = msg[2];
    if direction_raw > 181 {
        return Err(DecodeError::OutOfRange("direction"));
    }

    let timestamp = match le_u16(msg, 21) {
        TIMESTAMP_UNKNOWN => None,
        t if t > TIMESTAMP_MAX => return Err(DecodeError::OutOfRange("timestamp")),
        t => Some(t as f32 / 10.0),
    };

    Ok(Location {
        status,
        direction: decode_direction(direction_raw, east_west),
        speed_horizontal: decode_speed_horizontal(msg[3], speed_mult),
        speed_vertical: (msg[4] as i8) as f32 * VSPEED_DIV,
        latitude: decode_lat_lon(le_i32(msg, 5), 90.0, "latitude")?,
        longitude: decode_lat_lon(le_i32(msg, 9), 180.0, "longitude")?,
        altitude_baro: decode_altitude(le_u16(msg, 13)),
        altitude_geo: decode_altitude(le_u16(msg, 15)),
        height_type,
        height: decode_altitude(le_u16(msg, 17)),
        timestamp,
    })
}

/// Decode message type 0x4: System.
pub fn decode_system(msg: &[u8]) -> Result<System, DecodeError> {
    check_message(msg, MessageType::System)?;

    let flags = msg[1];
    Ok(System {
        operator_location_type: flags & 0x03,
        classification_type: (flags >> 2) & 0x07,
        operator_latitude: decode_lat_lon(le_i32(msg, 2), 90.0, "operator latitude")?,
        operator_longitude: decode_lat_lon(le_i32(msg, 6), 180.0, "operator longitude")?,
        area_count: le_u16(msg, 10),
        area_radius: msg[12] as u16 * AREA_RADIUS_MULT,
        area_ceiling: decode_altitude(le_u16(msg, 13)),
        area_floor: decode_altitude(le_u16(msg, 15)),
        operator_altitude_geo: decode_altitude(le_u16(msg, 18)),
        timestamp: le_u32(msg, 20),
    })
}

/// Decode message type 0x5: Operator ID.
pub fn decode_operator_id(msg: &[u8]) -> Result<OperatorId, DecodeError> {
    check_message(msg, MessageType::OperatorId)?;
    Ok(OperatorId {
        operator_id_type: msg[1],
        operator_id: decode_id_string(&msg[2..2 + ODID_ID_SIZE], "operator ID")?,
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Decode one 25-byte message, routing on the type nibble.
///
/// Unsupported types are `Ok(None)`: a pack may legally carry them.
pub fn decode_message(msg: &[u8]) -> Result<Option<OdidMessage>, DecodeError> {
    let header = *msg.first().ok_or(DecodeError::Truncated {
        needed: ODID_MESSAGE_SIZE,
        actual: 0,
    })?;

    let decoded = match MessageType::from_header(header) {
        MessageType::BasicId => OdidMessage::BasicId(decode_basic_id(msg)?),
        MessageType::Location => OdidMessage::Location(decode_location(msg)?),
        MessageType::System => OdidMessage::System(decode_system(msg)?),
        MessageType::OperatorId => OdidMessage::OperatorId(decode_operator_id(msg)?),
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}

/// Decode a message pack (type 0xF).
///
/// Header: `[0xF_ | version] [message size = 25] [count 1..=9]`, followed by
/// `count` messages. Any failing sub-message fails the whole pack.
pub fn decode_pack(buf: &[u8]) -> Result<UasData, DecodeError> {
    if buf.len() < 3 {
        return Err(DecodeError::Truncated {
            needed: 3,
            actual: buf.len(),
        });
    }
    let msg_type = MessageType::from_header(buf[0]);
    if msg_type != MessageType::Pack {
        return Err(DecodeError::WrongType {
            expected: MessageType::Pack.nibble(),
            actual: msg_type.nibble(),
        });
    }
    if buf[1] as usize != ODID_MESSAGE_SIZE {
        return Err(DecodeError::BadPack("message size"));
    }
    let count = buf[2] as usize;
    if count == 0 || count > ODID_PACK_MAX_MESSAGES {
        return Err(DecodeError::BadPack("message count"));
    }
    let needed = 3 + count * ODID_MESSAGE_SIZE;
    if buf.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            actual: buf.len(),
        });
    }

    let mut data = UasData::default();
    for msg in buf[3..needed].chunks_exact(ODID_MESSAGE_SIZE) {
        if MessageType::from_header(msg[0]) == MessageType::Pack {
            return Err(DecodeError::BadPack("nested pack"));
        }
        if let Some(decoded) = decode_message(msg)? {
            data.absorb(decoded);
        }
    }
    Ok(data)
}

/// Decode either a single message or a pack, whichever the header says.
pub fn decode_any(buf: &[u8]) -> Result<UasData, DecodeError> {
    let header = *buf.first().ok_or(DecodeError::Truncated {
        needed: ODID_MESSAGE_SIZE,
        actual: 0,
    })?;

    if MessageType::from_header(header) == MessageType::Pack {
        return decode_pack(buf);
    }

    let mut data = UasData::default();
    if let Some(msg) = decode_message(buf)? {
        data.absorb(msg);
    }
    Ok(data)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
