//! Capture callback handler: classify, merge, enqueue, notify.
//!
//! `Sensor` owns every piece of state shared between capture callbacks and
//! tasks. Its `CaptureHandler` methods run on provider threads and do only
//! bounded, allocation-free work under short critical sections.

use std::sync::Arc;

use rid_core::alert::AlertCoordinator;
use rid_core::config::Config;
use rid_core::frame::{classify, CaptureSource};
use rid_core::schedule::ChannelBandCell;
use rid_core::tracker::SharedTrackTable;
use rid_core::types::Mac;

use crate::pipeline::EventPipeline;
use crate::radio::CaptureHandler;

/// Monotonic seconds since the sensor started.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: tokio::time::Instant,
}

impl Clock {
    pub fn new() -> Self {
        Clock {
            start: tokio::time::Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::new()
    }
}

/// Shared pieces are `Arc`s so the tasks can hold them directly.
pub struct Sensor {
    pub table: Arc<SharedTrackTable>,
    pub channel: Arc<ChannelBandCell>,
    pub alerts: Arc<AlertCoordinator>,
    pub pipeline: Arc<EventPipeline>,
    pub clock: Clock,
}

impl Sensor {
    pub fn new(config: &Config) -> Self {
        let schedule = config.schedule();
        Sensor {
            table: Arc::new(SharedTrackTable::new(config.tracks.overflow)),
            channel: Arc::new(ChannelBandCell::new(schedule.current())),
            alerts: Arc::new(AlertCoordinator::new(
                config.alert.heartbeat_secs,
                config.alert.stale_secs,
            )),
            pipeline: Arc::new(EventPipeline::new()),
            clock: Clock::new(),
        }
    }

    fn handle(&self, raw: &[u8], source: CaptureSource) {
        let Some(detection) = classify(raw, source, self.channel.load()) else {
            return;
        };
        let now = self.clock.now();
        let record = self.table.upsert(&detection, now);
        // A full queue only loses the notification; the table keeps the update
        let _ = self.pipeline.try_send(record);
        self.alerts.notify_detection(now);
    }
}

impl CaptureHandler for Sensor {
    fn on_wifi_management_frame(&self, raw: &[u8], rssi: i8) {
        self.handle(raw, CaptureSource::WifiMgmt { rssi });
    }

    fn on_ble_advertisement(&self, mac: Mac, rssi: i8, payload: &[u8]) {
        self.handle(payload, CaptureSource::Ble { mac, rssi });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rid_core::alert::AlertState;
    use rid_core::encode::*;
    use rid_core::frame::PARROT_OUI;
    use rid_core::tracker::MAX_TRACKS;
    use rid_core::types::*;

    fn basic_id_msg(serial: &str) -> [u8; ODID_MESSAGE_SIZE] {
        let mut uas_id = IdString::new();
        uas_id.push_str(serial).unwrap();
        encode_basic_id(&BasicId {
            id_type: IdType::SerialNumber,
            ua_type: 2,
            uas_id,
        })
    }

    fn mac(n: u8) -> Mac {
        [0x02, 0x10, 0x20, 0x30, 0x40, n]
    }

    #[test]
    fn test_wifi_detection_flows_through() {
        let sensor = Sensor::new(&Config::default());
        sensor.channel.store(ChannelBand::new(157, Band::FiveGHz));

        let pack = encode_pack(&[basic_id_msg("SERIAL1")]).unwrap();
        let frame = build_beacon_frame(&mac(1), PARROT_OUI, 0, &pack);
        sensor.on_wifi_management_frame(&frame, -48);

        assert_eq!(sensor.table.len(), 1);
        let rec = sensor.pipeline.try_recv().unwrap();
        assert_eq!(rec.mac, mac(1));
        assert_eq!(rec.uav_id.as_str(), "SERIAL1");
        assert_eq!(rec.channel, 157);
        assert_eq!(rec.band, Band::FiveGHz);
        assert_eq!(sensor.alerts.state(), AlertState::InRange);
        assert!(sensor.alerts.take_detected());
    }

    #[test]
    fn test_ble_detection_flows_through() {
        let sensor = Sensor::new(&Config::default());
        let payload = build_ble_advertisement(0, &basic_id_msg("BLE1"));
        sensor.on_ble_advertisement(mac(2), -75, &payload);

        let rec = sensor.table.get(&mac(2)).unwrap();
        assert_eq!(rec.band, Band::Ble);
        assert_eq!(rec.rssi, -75);
        assert_eq!(sensor.pipeline.len(), 1);
    }

    #[test]
    fn test_non_remote_id_ignored() {
        let sensor = Sensor::new(&Config::default());
        sensor.on_wifi_management_frame(&[0x80; 64], -40);
        sensor.on_ble_advertisement(mac(3), -40, &[0x02, 0x01, 0x06]);
        assert!(sensor.table.is_empty());
        assert!(sensor.pipeline.is_empty());
        assert_eq!(sensor.alerts.state(), AlertState::Idle);
    }

    #[test]
    fn test_zero_mac_not_tracked_or_alerted() {
        let sensor = Sensor::new(&Config::default());
        let payload = build_ble_advertisement(0, &basic_id_msg("GHOST"));
        sensor.on_ble_advertisement(UNSET_MAC, -50, &payload);
        assert!(sensor.table.is_empty());
        assert!(sensor.pipeline.is_empty());
        assert_eq!(sensor.alerts.state(), AlertState::Idle);

        sensor.on_ble_advertisement(mac(4), -50, &build_ble_advertisement(0, &basic_id_msg("REAL")));
        assert_eq!(sensor.table.get(&mac(4)).unwrap().uav_id.as_str(), "REAL");
    }

    #[test]
    fn test_queue_full_keeps_table_update() {
        let sensor = Sensor::new(&Config::default());
        let payload = build_ble_advertisement(0, &basic_id_msg("X"));
        for n in 0..=MAX_TRACKS as u8 {
            sensor.on_ble_advertisement(mac(1), -60 - n as i8, &payload);
        }
        assert_eq!(sensor.pipeline.dropped(), 1);
        assert_eq!(sensor.table.len(), 1);
        // The dropped event's RSSI still reached the table
        assert_eq!(sensor.table.get(&mac(1)).unwrap().rssi, -60 - MAX_TRACKS as i8);
    }

    #[test]
    fn test_initial_channel_from_config() {
        let sensor = Sensor::new(&Config::default());
        assert_eq!(
            sensor.channel.load(),
            ChannelBand::new(6, Band::TwoPointFourGHz)
        );
    }
}
