//! Bounded per-aircraft table keyed by transmitter MAC.
//!
//! Pure logic: a fixed array of `MAX_TRACKS` slots, merged in place from
//! classified detections. Never allocates, so `upsert` is safe from capture
//! callbacks. Records are never deleted; staleness is only interpreted by the
//! alert coordinator.

use core::cell::RefCell;

use crate::types::*;

/// Maximum aircraft tracked at once.
pub const MAX_TRACKS: usize = 8;

/// A record is considered out of range after this many seconds of silence.
pub const STALE_TIMEOUT: f64 = 7.0;

// ---------------------------------------------------------------------------
// Detection record
// ---------------------------------------------------------------------------

/// Everything known about one aircraft, merged across frames.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub mac: Mac,
    pub rssi: i8,
    /// Monotonic seconds since start.
    pub last_seen: f64,
    pub operator_id: IdString,
    pub uav_id: IdString,

    // Aircraft position
    pub drone_lat: f64,
    pub drone_lon: f64,
    pub altitude_msl: i32,
    pub height_agl: i32,
    pub speed_horizontal: i32,
    pub heading: i32,

    // Operator position
    pub pilot_lat: f64,
    pub pilot_lon: f64,

    pub band: Band,
    pub channel: u8,
    /// Set whenever a merge changed a field; cleared by `mark_read`.
    pub dirty: bool,
}

impl DetectionRecord {
    pub const EMPTY: DetectionRecord = DetectionRecord {
        mac: UNSET_MAC,
        rssi: 0,
        last_seen: 0.0,
        operator_id: IdString::new(),
        uav_id: IdString::new(),
        drone_lat: 0.0,
        drone_lon: 0.0,
        altitude_msl: 0,
        height_agl: 0,
        speed_horizontal: 0,
        heading: 0,
        pilot_lat: 0.0,
        pilot_lon: 0.0,
        band: Band::Unknown,
        channel: 0,
        dirty: false,
    };

    pub fn is_free(&self) -> bool {
        self.mac == UNSET_MAC
    }

    pub fn age(&self, now: f64) -> f64 {
        now - self.last_seen
    }

    pub fn is_stale(&self, now: f64, window: f64) -> bool {
        self.age(now) > window
    }

    pub fn has_position(&self) -> bool {
        self.drone_lat != 0.0 || self.drone_lon != 0.0
    }

    /// Merge a detection field by field. Fields the detection doesn't carry
    /// keep their earlier values.
    pub fn merge(&mut self, detection: &Detection, now: f64) {
        let before = self.clone();

        self.mac = detection.mac;
        self.rssi = detection.rssi;
        self.last_seen = now;
        self.band = detection.band;
        self.channel = detection.channel;

        let data = &detection.data;
        if let Some(basic) = &data.basic_id {
            self.uav_id = basic.uas_id.clone();
        }
        if let Some(loc) = &data.location {
            self.drone_lat = loc.latitude;
            self.drone_lon = loc.longitude;
            self.altitude_msl = loc.altitude_geo as i32;
            self.height_agl = loc.height as i32;
            self.speed_horizontal = loc.speed_horizontal as i32;
            self.heading = loc.direction as i32;
        }
        if let Some(sys) = &data.system {
            self.pilot_lat = sys.operator_latitude;
            self.pilot_lon = sys.operator_longitude;
        }
        if let Some(op) = &data.operator_id {
            self.operator_id = op.operator_id.clone();
        }

        // last_seen always moves; only content changes count
        let changed = self.mac != before.mac
            || self.rssi != before.rssi
            || self.band != before.band
            || self.channel != before.channel
            || self.uav_id != before.uav_id
            || self.operator_id != before.operator_id
            || self.drone_lat != before.drone_lat
            || self.drone_lon != before.drone_lon
            || self.altitude_msl != before.altitude_msl
            || self.height_agl != before.height_agl
            || self.speed_horizontal != before.speed_horizontal
            || self.heading != before.heading
            || self.pilot_lat != before.pilot_lat
            || self.pilot_lon != before.pilot_lon;
        self.dirty |= changed;
    }
}

impl Default for DetectionRecord {
    fn default() -> Self {
        DetectionRecord::EMPTY
    }
}

// ---------------------------------------------------------------------------
// Track table
// ---------------------------------------------------------------------------

/// What to do when the table is full and an unseen MAC arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Overwrite slot 0 every time.
    #[default]
    OverwriteFirst,
    /// Overwrite the least recently seen record.
    EvictOldest,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::OverwriteFirst => "overwrite-first",
            OverflowPolicy::EvictOldest => "evict-oldest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "overwrite-first" => Some(OverflowPolicy::OverwriteFirst),
            "evict-oldest" => Some(OverflowPolicy::EvictOldest),
            _ => None,
        }
    }
}

/// Fixed-capacity arena of detection records.
///
/// A slot whose MAC is all zeroes is free. Slots fill in order, so occupied
/// slots are always a prefix of the array.
pub struct TrackTable {
    slots: [DetectionRecord; MAX_TRACKS],
    policy: OverflowPolicy,

    // Counters
    pub total_upserts: u64,
    pub overwrites: u64,
}

impl TrackTable {
    pub const fn new(policy: OverflowPolicy) -> Self {
        TrackTable {
            slots: [DetectionRecord::EMPTY; MAX_TRACKS],
            policy,
            total_upserts: 0,
            overwrites: 0,
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Merge a detection into its MAC's record, creating one if needed.
    /// Returns a copy of the record after the merge. The all-zero MAC is
    /// never stored; its merged copy is returned as-is.
    pub fn upsert(&mut self, detection: &Detection, now: f64) -> DetectionRecord {
        if detection.mac == UNSET_MAC {
            let mut rec = DetectionRecord::EMPTY;
            rec.merge(detection, now);
            return rec;
        }
        self.total_upserts += 1;
        let idx = self.slot_for(&detection.mac);
        let slot = &mut self.slots[idx];
        slot.merge(detection, now);
        slot.clone()
    }

    fn slot_for(&mut self, mac: &Mac) -> usize {
        if let Some(i) = self.slots.iter().position(|r| r.mac == *mac) {
            return i;
        }
        if let Some(i) = self.slots.iter().position(|r| r.is_free()) {
            self.slots[i] = DetectionRecord::EMPTY;
            return i;
        }

        self.overwrites += 1;
        let idx = match self.policy {
            OverflowPolicy::OverwriteFirst => 0,
            OverflowPolicy::EvictOldest => self
                .slots
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.last_seen.total_cmp(&b.last_seen))
                .map(|(i, _)| i)
                .unwrap_or(0),
        };
        // A new aircraft starts from a blank record
        self.slots[idx] = DetectionRecord::EMPTY;
        idx
    }

    pub fn get(&self, mac: &Mac) -> Option<&DetectionRecord> {
        if *mac == UNSET_MAC {
            return None;
        }
        self.slots.iter().find(|r| r.mac == *mac)
    }

    /// Clear the dirty flag. Returns false if the MAC isn't tracked.
    pub fn mark_read(&mut self, mac: &Mac) -> bool {
        if *mac == UNSET_MAC {
            return false;
        }
        match self.slots.iter_mut().find(|r| r.mac == *mac) {
            Some(r) => {
                r.dirty = false;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|r| !r.is_free()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectionRecord> {
        self.slots.iter().filter(|r| !r.is_free())
    }

    /// Copy of every occupied record, in slot order.
    pub fn snapshot(&self) -> heapless::Vec<DetectionRecord, MAX_TRACKS> {
        self.iter().cloned().collect()
    }

    /// True if any record was seen within `window` seconds of `now`.
    pub fn any_seen_within(&self, now: f64, window: f64) -> bool {
        self.iter().any(|r| !r.is_stale(now, window))
    }
}

impl Default for TrackTable {
    fn default() -> Self {
        TrackTable::new(OverflowPolicy::default())
    }
}

// ---------------------------------------------------------------------------
// Shared table
// ---------------------------------------------------------------------------

/// `TrackTable` behind a critical section, shared by capture callbacks and
/// tasks. Each call holds the section only for the table operation itself.
pub struct SharedTrackTable {
    inner: critical_section::Mutex<RefCell<TrackTable>>,
}

impl SharedTrackTable {
    pub const fn new(policy: OverflowPolicy) -> Self {
        SharedTrackTable {
            inner: critical_section::Mutex::new(RefCell::new(TrackTable::new(policy))),
        }
    }

    /// Run `f` with exclusive access to the table.
    pub fn with<R>(&self, f: impl FnOnce(&mut TrackTable) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    pub fn upsert(&self, detection: &Detection, now: f64) -> DetectionRecord {
        self.with(|t| t.upsert(detection, now))
    }

    pub fn snapshot(&self) -> heapless::Vec<DetectionRecord, MAX_TRACKS> {
        self.with(|t| t.snapshot())
    }

    pub fn get(&self, mac: &Mac) -> Option<DetectionRecord> {
        self.with(|t| t.get(mac).cloned())
    }

    pub fn mark_read(&self, mac: &Mac) -> bool {
        self.with(|t| t.mark_read(mac))
    }

    pub fn len(&self) -> usize {
        self.with(|t| t.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn any_seen_within(&self, now: f64, window: f64) -> bool {
        self.with(|t| t.any_seen_within(now, window))
    }
}

impl Default for SharedTrackTable {
    fn default() -> Self {
        SharedTrackTable::new(OverflowPolicy::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
