//! rid-core: Pure decode + tracking library for ASTM F3411 Remote ID.
//!
//! No async, no I/O apart from the config file. Shared by `rid-feeder`
//! (capture files, test transmitter) and `rid-sensor` (the running sensor).

pub mod alert;
pub mod config;
pub mod encode;
pub mod frame;
pub mod odid;
pub mod schedule;
pub mod tracker;
pub mod types;

// Re-export commonly used types at crate root
pub use alert::{AlertCoordinator, AlertState};
pub use frame::{classify, CaptureSource, Carrier};
pub use odid::{decode_any, decode_pack};
pub use schedule::{ChannelBandCell, ChannelSchedule};
pub use tracker::{DetectionRecord, OverflowPolicy, SharedTrackTable, TrackTable, MAX_TRACKS};
pub use types::*;
