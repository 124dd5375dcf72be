//! Channel-hop task.
//!
//! Holds each schedule state for the dwell time, retunes the radio and
//! publishes the new channel for capture callbacks. A failed retune is logged
//! and the published channel keeps describing where the radio actually is.

use std::sync::Arc;

use log::{info, warn};

use rid_core::schedule::{ChannelBandCell, ChannelSchedule};
use rid_core::types::ChannelBand;

use crate::radio::{Radio, RadioError};

/// Advance one state. The published channel only changes on success.
pub fn hop(
    schedule: &mut ChannelSchedule,
    radio: &dyn Radio,
    published: &ChannelBandCell,
) -> Result<ChannelBand, RadioError> {
    let next = schedule.advance();
    radio.set_wifi_channel(next.channel)?;
    published.store(next);
    Ok(next)
}

/// Tune to the schedule's starting channel, then hop forever.
pub async fn run_channel_hopper(
    mut schedule: ChannelSchedule,
    radio: Arc<dyn Radio>,
    published: Arc<ChannelBandCell>,
) {
    let start = schedule.current();
    match radio.set_wifi_channel(start.channel) {
        Ok(()) => published.store(start),
        Err(e) => warn!("Initial tune failed: {e}"),
    }

    if !schedule.is_hopping() {
        info!("Single-band mode: fixed on channel {}", start.channel);
        return;
    }

    let sweep: Vec<String> = schedule.sweep().iter().map(|c| c.channel.to_string()).collect();
    info!(
        "Channel hopping: {} every {} ms",
        sweep.join(" -> "),
        schedule.dwell().as_millis()
    );

    loop {
        tokio::time::sleep(schedule.dwell()).await;
        if let Err(e) = hop(&mut schedule, radio.as_ref(), &published) {
            warn!("{e}");
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
    use std::time::Duration;

    use rid_core::types::Band;

    /// Records every retune; fails on one channel.
    struct TestRadio {
        tunes: Mutex<Vec<u8>>,
        broken: Option<u8>,
    }

    impl TestRadio {
        fn new(broken: Option<u8>) -> Self {
            TestRadio {
                tunes: Mutex::new(Vec::new()),
                broken,
            }
        }
    }

    impl Radio for TestRadio {
        fn set_wifi_channel(&self, channel: u8) -> Result<(), RadioError> {
            self.tunes.lock().unwrap().push(channel);
            if Some(channel) == self.broken {
                return Err(RadioError::Retune {
                    channel,
                    reason: "test".into(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_hop_publishes_on_success() {
        let mut schedule = ChannelSchedule::default();
        let radio = TestRadio::new(None);
        let cell = ChannelBandCell::default();
        let next = hop(&mut schedule, &radio, &cell).unwrap();
        assert_eq!(next, ChannelBand::new(149, Band::FiveGHz));
        assert_eq!(cell.load(), next);
    }

    #[test]
    fn test_failed_hop_keeps_published_and_advances() {
        let mut schedule = ChannelSchedule::default();
        let radio = TestRadio::new(Some(153));
        let cell = ChannelBandCell::default();

        hop(&mut schedule, &radio, &cell).unwrap();
        assert!(hop(&mut schedule, &radio, &cell).is_err());
        assert_eq!(cell.load().channel, 149);

        // Next dwell still moves on
        let next = hop(&mut schedule, &radio, &cell).unwrap();
        assert_eq!(next.channel, 157);
        assert_eq!(cell.load().channel, 157);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hopper_visits_each_state_per_dwell() {
        let radio = Arc::new(TestRadio::new(None));
        let cell = Arc::new(ChannelBandCell::default());
        let schedule = ChannelSchedule::default();
        let dwell = schedule.dwell();

        let task = tokio::spawn(run_channel_hopper(schedule, radio.clone(), cell.clone()));

        // Initial tune plus two full sweeps of six states
        tokio::time::sleep(dwell * 12 + dwell / 2).await;
        task.abort();

        let tunes = radio.tunes.lock().unwrap().clone();
        assert_eq!(
            tunes,
            vec![6, 149, 153, 157, 161, 165, 6, 149, 153, 157, 161, 165, 6]
        );
        assert_eq!(cell.load(), ChannelBand::new(6, Band::TwoPointFourGHz));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_band_tunes_once() {
        let radio = Arc::new(TestRadio::new(None));
        let cell = Arc::new(ChannelBandCell::default());
        let schedule = ChannelSchedule::single_band(1, Duration::from_millis(30));

        run_channel_hopper(schedule, radio.clone(), cell.clone()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(*radio.tunes.lock().unwrap(), vec![1]);
        assert_eq!(cell.load().channel, 1);
    }
}
