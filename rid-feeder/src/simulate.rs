//! Synthetic Remote ID transmitter.
//!
//! Generates a random aircraft identity and flies it in a circle around a
//! random home point, emitting one capture record per broadcast. Records can
//! be replayed into the sensor to exercise the full pipeline without radios.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rid_core::encode::{
    build_astm_beacon_frame, build_ble_advertisement, build_nan_action_frame, encode_message,
    encode_uas_data,
};
use rid_core::schedule::{DEFAULT_5GHZ_CHANNELS, DEFAULT_FIXED_CHANNEL};
use rid_core::types::*;

use crate::capture::CaptureRecord;

/// Radius of the simulated orbit (~220 m).
pub const CIRCLE_RADIUS_DEG: f64 = 0.002;
pub const ORBIT_PERIOD_SEC: f64 = 60.0;
pub const BASE_ALTITUDE_M: f64 = 100.0;
pub const SPEED_MPS: f64 = 15.0;
pub const DEFAULT_RATE_HZ: f64 = 4.0;

const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How the simulated aircraft broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Carrier {
    /// WiFi NAN service discovery action frames.
    #[default]
    Nan,
    /// WiFi beacons with an ASTM vendor IE.
    Beacon,
    /// BLE legacy advertising, one message per advertisement.
    Ble,
}

impl FromStr for Carrier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nan" => Ok(Carrier::Nan),
            "beacon" => Ok(Carrier::Beacon),
            "ble" => Ok(Carrier::Ble),
            other => Err(format!("unknown carrier '{other}' (expected nan, beacon or ble)")),
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Carrier::Nan => "nan",
            Carrier::Beacon => "beacon",
            Carrier::Ble => "ble",
        })
    }
}

/// WiFi band the transmitter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxBand {
    /// Rotate through the UNII-3 channels, one per broadcast.
    #[default]
    FiveGHz,
    /// Fixed 2.4 GHz channel.
    TwoPointFourGHz,
}

impl FromStr for TxBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5" | "5ghz" | "5GHz" => Ok(TxBand::FiveGHz),
            "2.4" | "2.4ghz" | "2.4GHz" => Ok(TxBand::TwoPointFourGHz),
            other => Err(format!("unknown band '{other}' (expected 5 or 2.4)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity and flight model
// ---------------------------------------------------------------------------

/// Random aircraft identity, fixed for the life of the simulator.
#[derive(Debug, Clone)]
pub struct Identity {
    pub mac: Mac,
    pub serial: IdString,
    pub operator: IdString,
    pub home_lat: f64,
    pub home_lon: f64,
}

impl Identity {
    pub fn random(rng: &mut impl Rng) -> Self {
        let mut mac = [0u8; 6];
        rng.fill(&mut mac);
        // Locally administered, unicast
        mac[0] = (mac[0] & 0xFC) | 0x02;

        Identity {
            mac,
            serial: random_id(rng, "TEST", 12),
            operator: random_id(rng, "OP", 8),
            home_lat: 30.0 + rng.gen_range(0..15_000) as f64 / 1000.0,
            home_lon: -120.0 + rng.gen_range(0..30_000) as f64 / 1000.0,
        }
    }
}

fn random_id(rng: &mut impl Rng, prefix: &str, len: usize) -> IdString {
    let mut id = IdString::new();
    for c in prefix.chars() {
        let _ = id.push(c);
    }
    for _ in 0..len {
        let c = ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char;
        let _ = id.push(c);
    }
    id
}

/// Position and motion at a point in the orbit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightState {
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
}

/// Circular orbit around `(home_lat, home_lon)`, `elapsed` seconds in.
pub fn flight_state(home_lat: f64, home_lon: f64, elapsed: f64) -> FlightState {
    let angle = elapsed / ORBIT_PERIOD_SEC * 2.0 * PI;
    let heading = (360.0 - angle.to_degrees() + 90.0).rem_euclid(360.0);
    FlightState {
        lat: home_lat + CIRCLE_RADIUS_DEG * angle.sin(),
        lon: home_lon + CIRCLE_RADIUS_DEG * angle.cos(),
        altitude: BASE_ALTITUDE_M + 10.0 * (angle * 3.0).sin(),
        speed: SPEED_MPS + 2.0 * (angle * 2.0).sin(),
        heading,
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct Simulator {
    pub identity: Identity,
    carrier: Carrier,
    band: TxBand,
    rng: StdRng,
    counter: u8,
    channel_idx: usize,
    ble_idx: usize,
}

impl Simulator {
    /// New simulator with a random identity. A seed makes runs reproducible.
    pub fn new(carrier: Carrier, band: TxBand, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let identity = Identity::random(&mut rng);
        Simulator {
            identity,
            carrier,
            band,
            rng,
            counter: 0,
            channel_idx: 0,
            ble_idx: 0,
        }
    }

    pub fn carrier(&self) -> Carrier {
        self.carrier
    }

    /// Everything the aircraft broadcasts at `elapsed` seconds.
    pub fn uas_data(&self, elapsed: f64) -> UasData {
        let id = &self.identity;
        let state = flight_state(id.home_lat, id.home_lon, elapsed);
        let alt = state.altitude as f32;

        UasData {
            basic_id: Some(BasicId {
                id_type: IdType::SerialNumber,
                ua_type: 2,
                uas_id: id.serial.clone(),
            }),
            location: Some(Location {
                status: 2,
                direction: state.heading as f32,
                speed_horizontal: state.speed as f32,
                speed_vertical: 0.0,
                latitude: state.lat,
                longitude: state.lon,
                altitude_baro: alt - 5.0,
                altitude_geo: alt,
                height_type: 0,
                height: alt,
                timestamp: Some((elapsed % 3600.0) as f32),
            }),
            system: Some(System {
                operator_location_type: 0,
                classification_type: 1,
                operator_latitude: id.home_lat,
                operator_longitude: id.home_lon,
                area_count: 1,
                area_radius: 0,
                area_ceiling: alt + 50.0,
                area_floor: 0.0,
                operator_altitude_geo: -1000.0,
                timestamp: 0,
            }),
            operator_id: Some(OperatorId {
                operator_id_type: 0,
                operator_id: id.operator.clone(),
            }),
        }
    }

    fn next_channel(&mut self) -> u8 {
        match self.band {
            TxBand::TwoPointFourGHz => DEFAULT_FIXED_CHANNEL,
            TxBand::FiveGHz => {
                let ch = DEFAULT_5GHZ_CHANNELS[self.channel_idx];
                self.channel_idx = (self.channel_idx + 1) % DEFAULT_5GHZ_CHANNELS.len();
                ch
            }
        }
    }

    /// Build the capture record for one broadcast at `elapsed` seconds.
    pub fn broadcast(&mut self, elapsed: f64) -> CaptureRecord {
        let data = self.uas_data(elapsed);
        let rssi: i8 = self.rng.gen_range(-85..=-45);
        let counter = self.counter;
        self.counter = self.counter.wrapping_add(1);
        let mac = self.identity.mac;

        match self.carrier {
            Carrier::Nan | Carrier::Beacon => {
                // A full UasData always fits in one pack
                let pack = encode_uas_data(&data).unwrap_or_default();
                let frame = match self.carrier {
                    Carrier::Nan => build_nan_action_frame(&mac, counter, &pack),
                    _ => build_astm_beacon_frame(&mac, counter, &pack),
                };
                let channel = self.next_channel();
                CaptureRecord::wifi(elapsed, rssi, frame, Some(channel))
            }
            Carrier::Ble => {
                // Rotate messages, one per legacy advertisement
                let messages: Vec<_> = data.messages().collect();
                let msg = &messages[self.ble_idx % messages.len()];
                self.ble_idx += 1;
                let payload = build_ble_advertisement(counter, &encode_message(msg));
                CaptureRecord::ble(elapsed, mac, rssi, payload)
            }
        }
    }

    /// All broadcasts over `duration` seconds at `rate_hz`.
    pub fn run(&mut self, duration: f64, rate_hz: f64) -> Vec<CaptureRecord> {
        let interval = 1.0 / rate_hz;
        let count = (duration * rate_hz).floor() as usize;
        (0..count).map(|i| self.broadcast(i as f64 * interval)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
