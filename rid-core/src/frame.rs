//! Classify raw captured frames as Remote ID carriers.
//!
//! Responsibilities:
//! - Gate WiFi management frames to beacons and NAN action frames
//! - Locate the message pack (vendor IE, NAN service info, BLE service data)
//! - Hand the pack to the OpenDroneID decoder
//! - Tag the result with MAC, RSSI and the channel/band active at capture
//!
//! Runs in capture-callback context: no allocation, no locking, no logging.
//! Every mismatch is a silent `None`.

use crate::odid::{decode_any, decode_pack};
use crate::types::*;

/// First byte of an 802.11 beacon (type management, subtype 8).
pub const BEACON_FRAME_CONTROL: u8 = 0x80;
/// First byte of an 802.11 action frame (type management, subtype 13).
pub const ACTION_FRAME_CONTROL: u8 = 0xD0;

/// Transmitter address (Address 2) offset in an 802.11 header.
pub const MAC_OFFSET: usize = 10;
/// 24-byte header + timestamp, beacon interval, capability.
pub const BEACON_IE_OFFSET: usize = 36;

pub const VENDOR_IE_TAG: u8 = 0xDD;
/// ASTM International OUI used for Remote ID beacons.
pub const ASTM_OUI: [u8; 3] = [0xFA, 0x0B, 0xBC];
/// Parrot OUI, same IE layout.
pub const PARROT_OUI: [u8; 3] = [0x90, 0x3A, 0xE6];
pub const ODID_OUIS: [[u8; 3]; 2] = [ASTM_OUI, PARROT_OUI];
/// Vendor type written by our beacons. Receivers accept any value.
pub const VENDOR_TYPE_ODID: u8 = 0x0D;

/// NAN cluster multicast destination used by Remote ID.
pub const NAN_DEST: Mac = [0x51, 0x6F, 0x9A, 0x01, 0x00, 0x00];
pub const NAN_BSSID: Mac = [0x50, 0x6F, 0x9A, 0xFF, 0xFF, 0xFF];
pub const WFA_OUI: [u8; 3] = [0x50, 0x6F, 0x9A];
/// First 6 bytes of SHA-256("org.opendroneid.remoteid").
pub const ODID_SERVICE_ID: [u8; 6] = [0x88, 0x69, 0x19, 0x9D, 0x92, 0x09];

/// 16-bit service UUID assigned to ASTM Remote ID.
pub const BLE_SERVICE_UUID: u16 = 0xFFFA;
/// Application code following the UUID in the service data.
pub const BLE_APP_CODE: u8 = 0x0D;

const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
const NAN_PACK_OFFSET: usize = 44;

/// Where a captured buffer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// Raw 802.11 management frame from the promiscuous callback.
    WifiMgmt { rssi: i8 },
    /// BLE advertisement payload; the scanner reports the address separately.
    Ble { mac: Mac, rssi: i8 },
}

/// How a Remote ID message pack was carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Carrier {
    Beacon,
    NanAction,
    BleServiceData,
}

impl Carrier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Carrier::Beacon => "beacon",
            Carrier::NanAction => "nan",
            Carrier::BleServiceData => "ble",
        }
    }
}

// ---------------------------------------------------------------------------
// Carrier parsing
// ---------------------------------------------------------------------------

/// True if the frame is addressed to the NAN Remote ID multicast group.
pub fn is_nan_action_frame(frame: &[u8]) -> bool {
    frame.len() >= MAC_OFFSET && frame[4..MAC_OFFSET] == NAN_DEST
}

/// Message pack inside a NAN service discovery frame.
pub fn nan_message_pack(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() <= NAN_PACK_OFFSET || frame[0] != ACTION_FRAME_CONTROL {
        return None;
    }
    if !is_nan_action_frame(frame) {
        return None;
    }
    // Public action / vendor specific / WFA NAN
    if frame[24] != 0x04 || frame[25] != 0x09 || frame[26..29] != WFA_OUI || frame[29] != 0x13 {
        return None;
    }
    // Service descriptor attribute for the OpenDroneID service
    if frame[30] != 0x03 || frame[33..39] != ODID_SERVICE_ID {
        return None;
    }
    let attr_len = u16::from_le_bytes([frame[31], frame[32]]) as usize;
    let service_info_len = frame[42] as usize;
    if service_info_len < 2 || attr_len < 10 + service_info_len {
        return None;
    }
    // Service info = message counter + pack
    let end = 43 + service_info_len;
    if end > frame.len() {
        return None;
    }
    Some(&frame[NAN_PACK_OFFSET..end])
}

/// Message pack inside the first Remote ID vendor IE of a beacon.
pub fn beacon_message_pack(frame: &[u8]) -> Option<&[u8]> {
    if frame.first() != Some(&BEACON_FRAME_CONTROL) {
        return None;
    }
    let mut offset = BEACON_IE_OFFSET;
    while offset + 2 <= frame.len() {
        let tag = frame[offset];
        let len = frame[offset + 1] as usize;
        let end = offset + 2 + len;
        if end > frame.len() {
            return None;
        }
        if tag == VENDOR_IE_TAG
            && len > 5
            && ODID_OUIS.iter().any(|oui| frame[offset + 2..offset + 5] == *oui)
        {
            // tag, len, OUI(3), vendor type (any), counter
            return Some(&frame[offset + 7..end]);
        }
        offset = end;
    }
    None
}

/// Remote ID service data inside BLE AD structures.
pub fn ble_message_body(payload: &[u8]) -> Option<&[u8]> {
    let mut pos = 0;
    while pos < payload.len() {
        let len = payload[pos] as usize;
        if len == 0 || pos + 1 + len > payload.len() {
            return None;
        }
        let ad_type = payload[pos + 1];
        let data = &payload[pos + 2..pos + 1 + len];
        if ad_type == AD_TYPE_SERVICE_DATA_16
            && data.len() > 4
            && u16::from_le_bytes([data[0], data[1]]) == BLE_SERVICE_UUID
            && data[2] == BLE_APP_CODE
        {
            // UUID(2), app code, counter
            return Some(&data[4..]);
        }
        pos += 1 + len;
    }
    None
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify a WiFi management frame, decoding its pack on a match.
pub fn classify_wifi(frame: &[u8], rssi: i8, current: ChannelBand) -> Option<(Carrier, Detection)> {
    if frame.len() < MAC_OFFSET + 6 {
        return None;
    }

    let (carrier, pack) = if is_nan_action_frame(frame) {
        (Carrier::NanAction, nan_message_pack(frame)?)
    } else if frame[0] == BEACON_FRAME_CONTROL {
        (Carrier::Beacon, beacon_message_pack(frame)?)
    } else {
        return None;
    };

    let mut mac = UNSET_MAC;
    mac.copy_from_slice(&frame[MAC_OFFSET..MAC_OFFSET + 6]);
    // The all-zero MAC marks a free table slot
    if mac == UNSET_MAC {
        return None;
    }
    let data = decode_pack(pack).ok()?;

    Some((
        carrier,
        Detection {
            mac,
            rssi,
            band: current.band,
            channel: current.channel,
            data,
        },
    ))
}

/// Classify a BLE advertisement payload.
pub fn classify_ble(mac: Mac, rssi: i8, payload: &[u8]) -> Option<Detection> {
    if mac == UNSET_MAC {
        return None;
    }
    let body = ble_message_body(payload)?;
    let data = decode_any(body).ok()?;
    Some(Detection {
        mac,
        rssi,
        band: Band::Ble,
        channel: 0,
        data,
    })
}

/// Classify any captured buffer.
///
/// `current` is the scheduler's last published channel; it only applies to
/// WiFi captures and may already be ahead of the channel the frame actually
/// arrived on.
pub fn classify(raw: &[u8], source: CaptureSource, current: ChannelBand) -> Option<Detection> {
    match source {
        CaptureSource::WifiMgmt { rssi } => classify_wifi(raw, rssi, current).map(|(_, d)| d),
        CaptureSource::Ble { mac, rssi } => classify_ble(mac, rssi, raw),
    }
}

/// Like `classify` but also reports the carrier. Used by inspection tools.
pub fn classify_with_carrier(
    raw: &[u8],
    source: CaptureSource,
    current: ChannelBand,
) -> Option<(Carrier, Detection)> {
    match source {
        CaptureSource::WifiMgmt { rssi } => classify_wifi(raw, rssi, current),
        CaptureSource::Ble { mac, rssi } => {
            classify_ble(mac, rssi, raw).map(|d| (Carrier::BleServiceData, d))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
