//! rid-feeder: capture-record I/O and the synthetic Remote ID transmitter.
//!
//! Used by the `rid-feeder` binary and by `rid-sensor`'s replay radio.

pub mod capture;
pub mod simulate;

pub use capture::{CaptureKind, CaptureRecord, CaptureWriter, FrameReader};
pub use simulate::Simulator;
