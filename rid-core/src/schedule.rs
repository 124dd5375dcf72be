//! WiFi channel hopping schedule and the published channel/band state.
//!
//! The schedule alternates one fixed 2.4 GHz channel with a sweep of 5 GHz
//! channels: `fixed, 5g[0], .., 5g[N-1], fixed, ..`. The sensor's hop task
//! drives it; capture callbacks only ever read the published `ChannelBand`.

use core::cell::Cell;
use std::time::Duration;

use crate::types::{Band, ChannelBand};

/// 2.4 GHz channel the receiver returns to between 5 GHz channels.
pub const DEFAULT_FIXED_CHANNEL: u8 = 6;

/// UNII-3 channels most Remote ID transmitters use on 5 GHz.
pub const DEFAULT_5GHZ_CHANNELS: [u8; 5] = [149, 153, 157, 161, 165];

/// Time spent on each channel.
pub const DEFAULT_DWELL_MS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    FixedTwoFourGHz,
    /// Index into the 5 GHz channel list.
    FiveGHzChannel(usize),
}

/// Hopping schedule. Pure state machine: `advance` returns the next channel,
/// the caller retunes the radio.
#[derive(Debug, Clone)]
pub struct ChannelSchedule {
    fixed_channel: u8,
    channels_5ghz: Vec<u8>,
    dwell: Duration,
    state: ScheduleState,
}

impl ChannelSchedule {
    /// Dual-band schedule. An empty 5 GHz list degrades to single-band.
    pub fn new(fixed_channel: u8, channels_5ghz: Vec<u8>, dwell: Duration) -> Self {
        ChannelSchedule {
            fixed_channel,
            channels_5ghz,
            dwell,
            state: ScheduleState::FixedTwoFourGHz,
        }
    }

    /// Stay on the fixed 2.4 GHz channel.
    pub fn single_band(fixed_channel: u8, dwell: Duration) -> Self {
        ChannelSchedule::new(fixed_channel, Vec::new(), dwell)
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    pub fn is_hopping(&self) -> bool {
        !self.channels_5ghz.is_empty()
    }

    /// Distinct states visited per sweep (N + 1).
    pub fn states_per_sweep(&self) -> usize {
        self.channels_5ghz.len() + 1
    }

    /// Channel and band for the current state.
    pub fn current(&self) -> ChannelBand {
        self.channel_for(self.state)
    }

    fn channel_for(&self, state: ScheduleState) -> ChannelBand {
        match state {
            ScheduleState::FixedTwoFourGHz => {
                ChannelBand::new(self.fixed_channel, Band::TwoPointFourGHz)
            }
            ScheduleState::FiveGHzChannel(i) => {
                ChannelBand::new(self.channels_5ghz[i], Band::FiveGHz)
            }
        }
    }

    /// Move to the next state and return its channel.
    pub fn advance(&mut self) -> ChannelBand {
        let n = self.channels_5ghz.len();
        self.state = match self.state {
            _ if n == 0 => ScheduleState::FixedTwoFourGHz,
            ScheduleState::FixedTwoFourGHz => ScheduleState::FiveGHzChannel(0),
            ScheduleState::FiveGHzChannel(i) if i + 1 < n => ScheduleState::FiveGHzChannel(i + 1),
            ScheduleState::FiveGHzChannel(_) => ScheduleState::FixedTwoFourGHz,
        };
        self.current()
    }

    /// One full sweep starting from the fixed channel.
    pub fn sweep(&self) -> Vec<ChannelBand> {
        std::iter::once(ScheduleState::FixedTwoFourGHz)
            .chain((0..self.channels_5ghz.len()).map(ScheduleState::FiveGHzChannel))
            .map(|s| self.channel_for(s))
            .collect()
    }
}

impl Default for ChannelSchedule {
    fn default() -> Self {
        ChannelSchedule::new(
            DEFAULT_FIXED_CHANNEL,
            DEFAULT_5GHZ_CHANNELS.to_vec(),
            Duration::from_millis(DEFAULT_DWELL_MS),
        )
    }
}

// ---------------------------------------------------------------------------
// Published channel state
// ---------------------------------------------------------------------------

/// The channel the radio is on, written by the hop task and read by capture
/// callbacks to tag detections.
pub struct ChannelBandCell {
    inner: critical_section::Mutex<Cell<ChannelBand>>,
}

impl ChannelBandCell {
    pub const fn new(initial: ChannelBand) -> Self {
        ChannelBandCell {
            inner: critical_section::Mutex::new(Cell::new(initial)),
        }
    }

    pub fn load(&self) -> ChannelBand {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    pub fn store(&self, value: ChannelBand) {
        critical_section::with(|cs| self.inner.borrow(cs).set(value));
    }
}

impl Default for ChannelBandCell {
    fn default() -> Self {
        ChannelBandCell::new(ChannelBand::new(DEFAULT_FIXED_CHANNEL, Band::TwoPointFourGHz))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_starts_on_fixed_channel() {
        let schedule = ChannelSchedule::default();
        assert_eq!(schedule.state(), ScheduleState::FixedTwoFourGHz);
        assert_eq!(
            schedule.current(),
            ChannelBand::new(6, Band::TwoPointFourGHz)
        );
        assert_eq!(schedule.dwell(), Duration::from_millis(30));
        assert!(schedule.is_hopping());
    }

    #[test]
    fn test_sweep_order() {
        let mut schedule = ChannelSchedule::default();
        let visited: Vec<u8> = (0..12).map(|_| schedule.advance().channel).collect();
        assert_eq!(
            visited,
            vec![149, 153, 157, 161, 165, 6, 149, 153, 157, 161, 165, 6]
        );
    }

    #[test]
    fn test_states_per_sweep() {
        let mut schedule = ChannelSchedule::default();
        assert_eq!(schedule.states_per_sweep(), 6);

        // After N + 1 advances the schedule is back where it started
        let start = schedule.state();
        let mut distinct = std::collections::HashSet::new();
        for _ in 0..schedule.states_per_sweep() {
            distinct.insert(schedule.current().channel);
            schedule.advance();
        }
        assert_eq!(distinct.len(), 6);
        assert_eq!(schedule.state(), start);
    }

    #[test]
    fn test_bands_tagged() {
        let mut schedule = ChannelSchedule::default();
        assert_eq!(schedule.advance().band, Band::FiveGHz);
        for _ in 0..4 {
            schedule.advance();
        }
        assert_eq!(schedule.advance().band, Band::TwoPointFourGHz);
    }

    #[test]
    fn test_single_band_stays_put() {
        let mut schedule = ChannelSchedule::single_band(1, Duration::from_millis(30));
        assert!(!schedule.is_hopping());
        assert_eq!(schedule.states_per_sweep(), 1);
        for _ in 0..5 {
            assert_eq!(schedule.advance(), ChannelBand::new(1, Band::TwoPointFourGHz));
        }
    }

    #[test]
    fn test_empty_5ghz_list_degrades() {
        let mut schedule = ChannelSchedule::new(11, vec![], Duration::from_millis(10));
        assert_eq!(schedule.advance().channel, 11);
        assert_eq!(schedule.state(), ScheduleState::FixedTwoFourGHz);
    }

    #[test]
    fn test_sweep_listing() {
        let schedule = ChannelSchedule::new(6, vec![36, 40], Duration::from_millis(30));
        let sweep: Vec<u8> = schedule.sweep().iter().map(|c| c.channel).collect();
        assert_eq!(sweep, vec![6, 36, 40]);
    }

    #[test]
    fn test_channel_cell() {
        let cell = ChannelBandCell::default();
        assert_eq!(cell.load().channel, 6);
        cell.store(ChannelBand::new(161, Band::FiveGHz));
        assert_eq!(cell.load(), ChannelBand::new(161, Band::FiveGHz));
    }
}
