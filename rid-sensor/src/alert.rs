//! Alert output: the sink trait, the console sink and the alert task.
//!
//! The task polls the coordinator every 50 ms, takes pending triggers and
//! plays them on the sink. Playback sleeps, so it never happens while a
//! critical section is held.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, trace};

use rid_core::alert::AlertCoordinator;
use rid_core::tracker::SharedTrackTable;

use crate::capture::Clock;

/// How often the alert task checks for triggers.
pub const ALERT_POLL: Duration = Duration::from_millis(50);

const DETECT_BEEPS: usize = 3;
const DETECT_ON: Duration = Duration::from_millis(150);
const DETECT_OFF: Duration = Duration::from_millis(50);
const HEARTBEAT_PULSES: usize = 2;
const HEARTBEAT_ON: Duration = Duration::from_millis(100);
const HEARTBEAT_OFF: Duration = Duration::from_millis(50);

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// A new aircraft came into range.
    async fn play_detected_alert(&self);

    /// An aircraft is still in range.
    async fn play_heartbeat_alert(&self);

    /// Visual indicator (LED on hardware).
    fn set_indicator(&self, on: bool);

    /// Boot chime. Optional.
    async fn play_startup(&self) {}
}

/// Host sink: logs, tracks an indicator flag and rings the terminal bell.
pub struct ConsoleAlertSink {
    audible: bool,
    indicator: AtomicBool,
}

impl ConsoleAlertSink {
    pub fn new(audible: bool) -> Self {
        ConsoleAlertSink {
            audible,
            indicator: AtomicBool::new(false),
        }
    }

    pub fn is_audible(&self) -> bool {
        self.audible
    }

    pub fn indicator(&self) -> bool {
        self.indicator.load(Ordering::Relaxed)
    }

    fn beep(&self) {
        if self.audible {
            let mut err = std::io::stderr();
            let _ = err.write_all(b"\x07");
            let _ = err.flush();
        }
    }

    async fn pulse(&self, on: Duration, off: Duration) {
        self.beep();
        self.set_indicator(true);
        tokio::time::sleep(on).await;
        self.set_indicator(false);
        tokio::time::sleep(off).await;
    }
}

#[async_trait]
impl AlertSink for ConsoleAlertSink {
    async fn play_detected_alert(&self) {
        info!("DRONE DETECTED! Playing alert sequence");
        for _ in 0..DETECT_BEEPS {
            self.pulse(DETECT_ON, DETECT_OFF).await;
        }
        info!("Detection complete - drone identified!");
    }

    async fn play_heartbeat_alert(&self) {
        info!("Heartbeat: drone still in range");
        for _ in 0..HEARTBEAT_PULSES {
            self.pulse(HEARTBEAT_ON, HEARTBEAT_OFF).await;
        }
    }

    fn set_indicator(&self, on: bool) {
        if self.indicator.swap(on, Ordering::Relaxed) != on {
            trace!("indicator {}", if on { "on" } else { "off" });
        }
    }

    async fn play_startup(&self) {
        info!(
            "Alerts {}",
            if self.audible { "audible" } else { "muted" }
        );
        // Five short flashes
        for _ in 0..5 {
            self.pulse(Duration::from_millis(120), Duration::from_millis(30)).await;
        }
    }
}

/// Poll the coordinator forever, playing triggered patterns.
pub async fn run_alert_task(
    alerts: Arc<AlertCoordinator>,
    table: Arc<SharedTrackTable>,
    sink: Arc<dyn AlertSink>,
    clock: Clock,
) {
    let mut interval = tokio::time::interval(ALERT_POLL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        alerts.tick_with_table(clock.now(), &table);

        if alerts.take_detected() {
            sink.play_detected_alert().await;
        }
        if alerts.take_heartbeat() {
            sink.play_heartbeat_alert().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use rid_core::types::*;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn play_detected_alert(&self) {
            self.calls.lock().unwrap().push("detected");
        }

        async fn play_heartbeat_alert(&self) {
            self.calls.lock().unwrap().push("heartbeat");
        }

        fn set_indicator(&self, _on: bool) {}
    }

    fn detection() -> Detection {
        Detection {
            mac: [0x02, 0, 0, 0, 0, 1],
            rssi: -60,
            band: Band::Ble,
            channel: 0,
            data: UasData::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_task_detected_heartbeat_then_idle() {
        let clock = Clock::new();
        let alerts = Arc::new(AlertCoordinator::default());
        let table = Arc::new(SharedTrackTable::default());
        let sink = Arc::new(RecordingSink::default());

        let task = tokio::spawn(run_alert_task(
            alerts.clone(),
            table.clone(),
            sink.clone(),
            clock,
        ));

        let now = clock.now();
        table.upsert(&detection(), now);
        alerts.notify_detection(now);

        // Heartbeat at ~5 s, out of range after 7 s, silence afterwards
        tokio::time::sleep(Duration::from_secs(30)).await;
        task.abort();

        assert_eq!(*sink.calls.lock().unwrap(), vec!["detected", "heartbeat"]);
        assert_eq!(alerts.state(), rid_core::alert::AlertState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_task_heartbeats_while_fresh() {
        let clock = Clock::new();
        let alerts = Arc::new(AlertCoordinator::default());
        let table = Arc::new(SharedTrackTable::default());
        let sink = Arc::new(RecordingSink::default());

        let task = tokio::spawn(run_alert_task(
            alerts.clone(),
            table.clone(),
            sink.clone(),
            clock,
        ));

        // Detection every second for 12 s
        for _ in 0..12 {
            let now = clock.now();
            table.upsert(&detection(), now);
            alerts.notify_detection(now);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        task.abort();

        let calls = sink.calls.lock().unwrap().clone();
        assert_eq!(calls.iter().filter(|c| **c == "detected").count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == "heartbeat").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_sink_patterns() {
        let sink = ConsoleAlertSink::new(false);
        assert!(!sink.is_audible());

        let start = tokio::time::Instant::now();
        sink.play_detected_alert().await;
        let took = start.elapsed();
        assert!(took >= Duration::from_millis(600) && took < Duration::from_millis(620));
        assert!(!sink.indicator());

        let start = tokio::time::Instant::now();
        sink.play_heartbeat_alert().await;
        let took = start.elapsed();
        assert!(took >= Duration::from_millis(300) && took < Duration::from_millis(320));
    }

    #[test]
    fn test_indicator() {
        let sink = ConsoleAlertSink::new(false);
        sink.set_indicator(true);
        assert!(sink.indicator());
        sink.set_indicator(false);
        assert!(!sink.indicator());
    }
}
