//! Encode OpenDroneID messages and wrap them in WiFi / BLE frames.
//!
//! The transmit-side mirror of `odid` and `frame`. Used by the synthetic test
//! transmitter in rid-feeder and to build fixtures in tests; every frame built
//! here is accepted by `frame::classify`.

use crate::frame::{
    ASTM_OUI, BEACON_IE_OFFSET, BLE_APP_CODE, BLE_SERVICE_UUID, NAN_BSSID, NAN_DEST,
    ODID_SERVICE_ID, VENDOR_IE_TAG, VENDOR_TYPE_ODID, WFA_OUI,
};
use crate::types::*;

/// Protocol version written into the low nibble of each header (ASTM F3411-22a).
pub const PROTOCOL_VERSION: u8 = 2;

const ALT_UNKNOWN: f32 = -1000.0;
const SPEED_UNKNOWN: f32 = 255.0;
const DIRECTION_UNKNOWN: f32 = 361.0;

// ---------------------------------------------------------------------------
// Field encoders
// ---------------------------------------------------------------------------

fn header(msg_type: MessageType) -> u8 {
    (msg_type.nibble() << 4) | PROTOCOL_VERSION
}

/// Altitude in metres to the 0.5 m / -1000 m offset encoding.
pub fn encode_altitude(metres: f32) -> u16 {
    if metres <= ALT_UNKNOWN {
        return 0;
    }
    ((metres + 1000.0) * 2.0).round().min(u16::MAX as f32) as u16
}

/// Horizontal speed to `(raw, multiplier)`, saturating at 254.25 m/s.
pub fn encode_speed_horizontal(speed: f32) -> (u8, bool) {
    if speed >= SPEED_UNKNOWN || speed < 0.0 {
        return (255, true);
    }
    if speed <= 255.0 * 0.25 {
        ((speed / 0.25).round() as u8, false)
    } else if speed < 254.25 {
        (((speed - 63.75) / 0.75).round() as u8, true)
    } else {
        (254, true)
    }
}

/// Direction in degrees to `(raw, east_west)`.
pub fn encode_direction(degrees: f32) -> (u8, bool) {
    if !(0.0..DIRECTION_UNKNOWN).contains(&degrees) {
        return (181, true);
    }
    let d = (degrees.round() as u16) % 360;
    if d < 180 {
        (d as u8, false)
    } else {
        ((d - 180) as u8, true)
    }
}

fn encode_lat_lon(degrees: f64) -> i32 {
    (degrees / 1e-7).round() as i32
}

fn put_id_string(out: &mut [u8], id: &str) {
    let bytes = id.as_bytes();
    let n = bytes.len().min(ODID_ID_SIZE);
    out[..n].copy_from_slice(&bytes[..n]);
}

// ---------------------------------------------------------------------------
// Message encoders
// ---------------------------------------------------------------------------

pub fn encode_basic_id(msg: &BasicId) -> [u8; ODID_MESSAGE_SIZE] {
    let mut out = [0u8; ODID_MESSAGE_SIZE];
    out[0] = header(MessageType::BasicId);
    out[1] = (msg.id_type.to_u8() << 4) | (msg.ua_type & 0x0F);
    put_id_string(&mut out[2..2 + ODID_ID_SIZE], &msg.uas_id);
    out
}

pub fn encode_location(msg: &Location) -> [u8; ODID_MESSAGE_SIZE] {
    let (direction, east_west) = encode_direction(msg.direction);
    let (speed, speed_mult) = encode_speed_horizontal(msg.speed_horizontal);
    let vspeed = (msg.speed_vertical / 0.5).round().clamp(-126.0, 126.0) as i8;

    let mut out = [0u8; ODID_MESSAGE_SIZE];
    out[0] = header(MessageType::Location);
    out[1] = (msg.status << 4)
        | ((msg.height_type & 0x01) << 2)
        | ((east_west as u8) << 1)
        | speed_mult as u8;
    out[2] = direction;
    out[3] = speed;
    out[4] = vspeed as u8;
    out[5..9].copy_from_slice(&encode_lat_lon(msg.latitude).to_le_bytes());
    out[9..13].copy_from_slice(&encode_lat_lon(msg.longitude).to_le_bytes());
    out[13..15].copy_from_slice(&encode_altitude(msg.altitude_baro).to_le_bytes());
    out[15..17].copy_from_slice(&encode_altitude(msg.altitude_geo).to_le_bytes());
    out[17..19].copy_from_slice(&encode_altitude(msg.height).to_le_bytes());
    let timestamp = match msg.timestamp {
        Some(t) => (t * 10.0).round().clamp(0.0, 36000.0) as u16,
        None => 0xFFFF,
    };
    out[21..23].copy_from_slice(&timestamp.to_le_bytes());
    out
}

pub fn encode_system(msg: &System) -> [u8; ODID_MESSAGE_SIZE] {
    let mut out = [0u8; ODID_MESSAGE_SIZE];
    out[0] = header(MessageType::System);
    out[1] = ((msg.classification_type & 0x07) << 2) | (msg.operator_location_type & 0x03);
    out[2..6].copy_from_slice(&encode_lat_lon(msg.operator_latitude).to_le_bytes());
    out[6..10].copy_from_slice(&encode_lat_lon(msg.operator_longitude).to_le_bytes());
    out[10..12].copy_from_slice(&msg.area_count.to_le_bytes());
    out[12] = (msg.area_radius / 10).min(255) as u8;
    out[13..15].copy_from_slice(&encode_altitude(msg.area_ceiling).to_le_bytes());
    out[15..17].copy_from_slice(&encode_altitude(msg.area_floor).to_le_bytes());
    out[18..20].copy_from_slice(&encode_altitude(msg.operator_altitude_geo).to_le_bytes());
    out[20..24].copy_from_slice(&msg.timestamp.to_le_bytes());
    out
}

pub fn encode_operator_id(msg: &OperatorId) -> [u8; ODID_MESSAGE_SIZE] {
    let mut out = [0u8; ODID_MESSAGE_SIZE];
    out[0] = header(MessageType::OperatorId);
    out[1] = msg.operator_id_type;
    put_id_string(&mut out[2..2 + ODID_ID_SIZE], &msg.operator_id);
    out
}

pub fn encode_message(msg: &OdidMessage) -> [u8; ODID_MESSAGE_SIZE] {
    match msg {
        OdidMessage::BasicId(m) => encode_basic_id(m),
        OdidMessage::Location(m) => encode_location(m),
        OdidMessage::System(m) => encode_system(m),
        OdidMessage::OperatorId(m) => encode_operator_id(m),
    }
}

/// Assemble a message pack. `None` for 0 or more than 9 messages.
pub fn encode_pack(messages: &[[u8; ODID_MESSAGE_SIZE]]) -> Option<Vec<u8>> {
    if messages.is_empty() || messages.len() > ODID_PACK_MAX_MESSAGES {
        return None;
    }
    let mut out = Vec::with_capacity(3 + messages.len() * ODID_MESSAGE_SIZE);
    out.push(header(MessageType::Pack));
    out.push(ODID_MESSAGE_SIZE as u8);
    out.push(messages.len() as u8);
    for msg in messages {
        out.extend_from_slice(msg);
    }
    Some(out)
}

/// Pack every populated slot of `data`.
pub fn encode_uas_data(data: &UasData) -> Option<Vec<u8>> {
    let messages: Vec<_> = data.messages().map(|m| encode_message(&m)).collect();
    encode_pack(&messages)
}

// ---------------------------------------------------------------------------
// Frame builders
// ---------------------------------------------------------------------------

/// 802.11 beacon carrying `pack` in a vendor-specific IE with the given OUI.
pub fn build_beacon_frame(mac: &Mac, oui: [u8; 3], counter: u8, pack: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(BEACON_IE_OFFSET + 7 + pack.len());
    // Frame control (beacon), duration
    frame.extend_from_slice(&[0x80, 0x00, 0x00, 0x00]);
    // DA broadcast, SA, BSSID
    frame.extend_from_slice(&[0xFF; 6]);
    frame.extend_from_slice(mac);
    frame.extend_from_slice(mac);
    // Sequence control
    frame.extend_from_slice(&[0x00, 0x00]);
    // Timestamp, beacon interval (100 TU), capability
    frame.extend_from_slice(&[0u8; 8]);
    frame.extend_from_slice(&[0x64, 0x00, 0x21, 0x04]);
    debug_assert_eq!(frame.len(), BEACON_IE_OFFSET);

    // Hidden SSID
    frame.extend_from_slice(&[0x00, 0x00]);

    frame.push(VENDOR_IE_TAG);
    frame.push((3 + 1 + 1 + pack.len()) as u8);
    frame.extend_from_slice(&oui);
    frame.push(VENDOR_TYPE_ODID);
    frame.push(counter);
    frame.extend_from_slice(pack);
    frame
}

/// Beacon using the ASTM OUI.
pub fn build_astm_beacon_frame(mac: &Mac, counter: u8, pack: &[u8]) -> Vec<u8> {
    build_beacon_frame(mac, ASTM_OUI, counter, pack)
}

/// WiFi NAN (Neighbor Awareness Networking) service discovery action frame.
pub fn build_nan_action_frame(mac: &Mac, counter: u8, pack: &[u8]) -> Vec<u8> {
    let service_info_len = 1 + pack.len();
    let attr_len = (ODID_SERVICE_ID.len() + 4 + service_info_len) as u16;

    let mut frame = Vec::with_capacity(44 + pack.len());
    // Frame control (action), duration
    frame.extend_from_slice(&[0xD0, 0x00, 0x00, 0x00]);
    frame.extend_from_slice(&NAN_DEST);
    frame.extend_from_slice(mac);
    frame.extend_from_slice(&NAN_BSSID);
    frame.extend_from_slice(&[0x00, 0x00]);

    // Public action, vendor specific, WFA OUI, NAN
    frame.extend_from_slice(&[0x04, 0x09]);
    frame.extend_from_slice(&WFA_OUI);
    frame.push(0x13);

    // Service descriptor attribute
    frame.push(0x03);
    frame.extend_from_slice(&attr_len.to_le_bytes());
    frame.extend_from_slice(&ODID_SERVICE_ID);
    frame.push(0x01); // instance id
    frame.push(0x00); // requestor instance id
    frame.push(0x10); // service control: published
    frame.push(service_info_len as u8);

    frame.push(counter);
    frame.extend_from_slice(pack);
    frame
}

/// BLE advertising payload: one service-data AD structure carrying `body`
/// (a single message for legacy advertising, or a pack for BLE 5).
pub fn build_ble_advertisement(counter: u8, body: &[u8]) -> Vec<u8> {
    let uuid = BLE_SERVICE_UUID.to_le_bytes();
    let mut payload = Vec::with_capacity(6 + body.len());
    payload.push((1 + 2 + 1 + 1 + body.len()) as u8);
    payload.push(0x16);
    payload.extend_from_slice(&uuid);
    payload.push(BLE_APP_CODE);
    payload.push(counter);
    payload.extend_from_slice(body);
    payload
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_altitude() {
        assert_eq!(encode_altitude(120.0), 2240);
        assert_eq!(encode_altitude(-1000.0), 0);
        assert_eq!(encode_altitude(100_000.0), u16::MAX);
    }

    #[test]
    fn test_encode_speed() {
        assert_eq!(encode_speed_horizontal(8.0), (32, false));
        assert_eq!(encode_speed_horizontal(63.75), (255, false));
        assert_eq!(encode_speed_horizontal(71.25), (10, true));
        assert_eq!(encode_speed_horizontal(254.5), (254, true));
        assert_eq!(encode_speed_horizontal(255.0), (255, true));
    }

    #[test]
    fn test_encode_direction() {
        assert_eq!(encode_direction(0.0), (0, false));
        assert_eq!(encode_direction(179.0), (179, false));
        assert_eq!(encode_direction(270.0), (90, true));
        assert_eq!(encode_direction(361.0), (181, true));
    }

    #[test]
    fn test_pack_limits() {
        let msg = [0u8; ODID_MESSAGE_SIZE];
        assert!(encode_pack(&[]).is_none());
        assert!(encode_pack(&[msg; 10]).is_none());
        let pack = encode_pack(&[msg; 9]).unwrap();
        assert_eq!(pack.len(), 3 + 9 * 25);
        assert_eq!(pack[0], 0xF2);
        assert_eq!(pack[1], 25);
        assert_eq!(pack[2], 9);
    }

    #[test]
    fn test_beacon_layout() {
        let mac = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
        let frame = build_astm_beacon_frame(&mac, 7, &[0xF2, 25, 0]);
        assert_eq!(frame[0], 0x80);
        assert_eq!(&frame[10..16], &mac);
        // SSID IE then vendor IE
        assert_eq!(frame[BEACON_IE_OFFSET], 0x00);
        let ie = BEACON_IE_OFFSET + 2;
        assert_eq!(frame[ie], 0xDD);
        assert_eq!(&frame[ie + 2..ie + 5], &ASTM_OUI);
        assert_eq!(frame[ie + 5], 0x0D);
        assert_eq!(frame[ie + 6], 7);
        assert_eq!(frame[ie + 7], 0xF2);
    }

    #[test]
    fn test_nan_layout() {
        let mac = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
        let frame = build_nan_action_frame(&mac, 3, &[0xAA; 28]);
        assert_eq!(frame[0], 0xD0);
        assert_eq!(&frame[4..10], &NAN_DEST);
        assert_eq!(&frame[10..16], &mac);
        assert_eq!(frame[24], 0x04);
        assert_eq!(frame[30], 0x03);
        assert_eq!(frame[42], 29);
        assert_eq!(frame[43], 3);
        assert_eq!(frame.len(), 44 + 28);
    }

    #[test]
    fn test_ble_layout() {
        let payload = build_ble_advertisement(1, &[0u8; ODID_MESSAGE_SIZE]);
        assert_eq!(payload.len(), 31);
        assert_eq!(&payload[..5], &[0x1E, 0x16, 0xFA, 0xFF, 0x0D]);
    }
}
