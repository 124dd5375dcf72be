//! In-range / heartbeat alert state machine.
//!
//! `notify_detection` is called from capture context and only flips flags
//! inside a critical section. The alert task calls `tick` periodically and
//! consumes triggers with `take_detected` / `take_heartbeat`, playing the
//! patterns outside any critical section.

use core::cell::RefCell;

use log::info;

use crate::tracker::{SharedTrackTable, STALE_TIMEOUT};

/// Seconds between heartbeat alerts while an aircraft is in range.
pub const HEARTBEAT_INTERVAL: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    InRange,
}

#[derive(Debug)]
struct AlertFlags {
    state: AlertState,
    detected: bool,
    heartbeat: bool,
    last_heartbeat: f64,
}

pub struct AlertCoordinator {
    flags: critical_section::Mutex<RefCell<AlertFlags>>,
    heartbeat_interval: f64,
    stale_window: f64,
}

impl AlertCoordinator {
    pub const fn new(heartbeat_interval: f64, stale_window: f64) -> Self {
        AlertCoordinator {
            flags: critical_section::Mutex::new(RefCell::new(AlertFlags {
                state: AlertState::Idle,
                detected: false,
                heartbeat: false,
                last_heartbeat: 0.0,
            })),
            heartbeat_interval,
            stale_window,
        }
    }

    pub fn heartbeat_interval(&self) -> f64 {
        self.heartbeat_interval
    }

    pub fn stale_window(&self) -> f64 {
        self.stale_window
    }

    pub fn state(&self) -> AlertState {
        critical_section::with(|cs| self.flags.borrow_ref(cs).state)
    }

    /// A Remote ID frame was classified. Safe from capture callbacks.
    pub fn notify_detection(&self, now: f64) {
        critical_section::with(|cs| {
            let mut flags = self.flags.borrow_ref_mut(cs);
            if flags.state == AlertState::Idle {
                flags.state = AlertState::InRange;
                flags.detected = true;
                flags.last_heartbeat = now;
            }
        });
    }

    /// Advance timers. `any_fresh` says whether any record was seen within
    /// the stale window.
    pub fn tick(&self, now: f64, any_fresh: bool) -> AlertState {
        let (state, went_idle) = critical_section::with(|cs| {
            let mut flags = self.flags.borrow_ref_mut(cs);
            if flags.state != AlertState::InRange {
                return (flags.state, false);
            }
            if !any_fresh {
                flags.state = AlertState::Idle;
                flags.heartbeat = false;
                return (AlertState::Idle, true);
            }
            if now - flags.last_heartbeat >= self.heartbeat_interval {
                flags.heartbeat = true;
                flags.last_heartbeat = now;
            }
            (flags.state, false)
        });

        if went_idle {
            info!(
                "Drone out of range: no Remote ID for {:.0}s",
                self.stale_window
            );
        }
        state
    }

    /// `tick` using the table's freshness.
    pub fn tick_with_table(&self, now: f64, table: &SharedTrackTable) -> AlertState {
        let fresh = table.any_seen_within(now, self.stale_window);
        self.tick(now, fresh)
    }

    /// Consume a pending `detected` trigger.
    pub fn take_detected(&self) -> bool {
        critical_section::with(|cs| core::mem::take(&mut self.flags.borrow_ref_mut(cs).detected))
    }

    /// Consume a pending heartbeat trigger.
    pub fn take_heartbeat(&self) -> bool {
        critical_section::with(|cs| core::mem::take(&mut self.flags.borrow_ref_mut(cs).heartbeat))
    }
}

impl Default for AlertCoordinator {
    fn default() -> Self {
        AlertCoordinator::new(HEARTBEAT_INTERVAL, STALE_TIMEOUT)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    /// Drive the coordinator like the alert task does, recording triggers.
    fn run(
        alerts: &AlertCoordinator,
        table: &SharedTrackTable,
        from: f64,
        to: f64,
        step: f64,
    ) -> (usize, usize) {
        let (mut detected, mut heartbeats) = (0, 0);
        let mut t = from;
        while t <= to {
            alerts.tick_with_table(t, table);
            detected += alerts.take_detected() as usize;
            heartbeats += alerts.take_heartbeat() as usize;
            t += step;
        }
        (detected, heartbeats)
    }

    fn detect(alerts: &AlertCoordinator, table: &SharedTrackTable, n: u8, now: f64) {
        let d = Detection {
            mac: [0x02, 0, 0, 0, 0, n],
            rssi: -50,
            band: Band::Ble,
            channel: 0,
            data: UasData::default(),
        };
        table.upsert(&d, now);
        alerts.notify_detection(now);
    }

    #[test]
    fn test_starts_idle() {
        let alerts = AlertCoordinator::default();
        assert_eq!(alerts.state(), AlertState::Idle);
        assert!(!alerts.take_detected());
        assert!(!alerts.take_heartbeat());
    }

    #[test]
    fn test_first_detection_triggers_once() {
        let alerts = AlertCoordinator::default();
        let table = SharedTrackTable::default();
        detect(&alerts, &table, 1, 0.0);
        detect(&alerts, &table, 1, 0.5);
        detect(&alerts, &table, 2, 1.0);
        assert_eq!(alerts.state(), AlertState::InRange);
        assert!(alerts.take_detected());
        assert!(!alerts.take_detected());
    }

    #[test]
    fn test_heartbeat_every_interval_while_fresh() {
        let alerts = AlertCoordinator::default();
        let table = SharedTrackTable::default();
        detect(&alerts, &table, 1, 0.0);
        assert!(alerts.take_detected());

        // Keep the aircraft fresh with a detection every second for 20 s
        let mut heartbeats = 0;
        for s in 1..=20 {
            let now = s as f64;
            detect(&alerts, &table, 1, now);
            let (d, h) = run(&alerts, &table, now, now + 0.95, 0.05);
            assert_eq!(d, 0);
            heartbeats += h;
        }
        assert_eq!(heartbeats, 4);
    }

    #[test]
    fn test_goes_idle_after_stale_window() {
        let alerts = AlertCoordinator::default();
        let table = SharedTrackTable::default();
        detect(&alerts, &table, 1, 0.0);
        alerts.take_detected();

        let (_, heartbeats) = run(&alerts, &table, 0.0, 7.0, 0.05);
        assert_eq!(heartbeats, 1);
        assert_eq!(alerts.state(), AlertState::InRange);

        assert_eq!(alerts.tick_with_table(7.1, &table), AlertState::Idle);
        let (_, heartbeats) = run(&alerts, &table, 7.1, 30.0, 0.05);
        assert_eq!(heartbeats, 0);
    }

    #[test]
    fn test_redetection_after_idle() {
        let alerts = AlertCoordinator::default();
        let table = SharedTrackTable::default();
        detect(&alerts, &table, 1, 0.0);
        alerts.take_detected();
        alerts.tick_with_table(10.0, &table);
        assert_eq!(alerts.state(), AlertState::Idle);

        detect(&alerts, &table, 1, 11.0);
        assert!(alerts.take_detected());
        assert_eq!(alerts.state(), AlertState::InRange);
    }

    #[test]
    fn test_configurable_timers() {
        let alerts = AlertCoordinator::new(1.0, 2.0);
        alerts.notify_detection(0.0);
        alerts.tick(1.0, true);
        assert!(alerts.take_heartbeat());
        alerts.tick(1.5, true);
        assert!(!alerts.take_heartbeat());
        assert_eq!(alerts.tick(3.0, false), AlertState::Idle);
        assert_eq!(alerts.stale_window(), 2.0);
    }

    #[test]
    fn test_idle_tick_is_noop() {
        let alerts = AlertCoordinator::default();
        assert_eq!(alerts.tick(100.0, true), AlertState::Idle);
        assert!(!alerts.take_heartbeat());
    }
}
