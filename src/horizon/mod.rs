//! Horizon event derivation from a minute-by-minute position table
//!
//! A single linear pass over adjacent samples `(a, b)`. For each threshold
//! `t`, `a.alt <= t < b.alt` is a rising crossing and `a.alt > t >= b.alt` a
//! falling one. The event is stamped with `b`'s key and `b`'s azimuth
//! truncated to whole degrees. A sample exactly at the threshold therefore
//! counts as below it when the next sample is higher.

use crate::constants::{CIVIL_TWILIGHT_DEG, HORIZON_DEG};
use crate::tables::{EventKind, EventRecord, EventTable, PositionSample, PositionTable};
use crate::Result;

/// An altitude threshold and the event kinds emitted when crossing it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    /// Altitude in degrees
    pub degrees: f64,
    /// Kind emitted when the body goes up through the threshold
    pub rising: EventKind,
    /// Kind emitted when the body goes down through the threshold
    pub falling: EventKind,
}

impl Threshold {
    pub const fn new(degrees: f64, rising: EventKind, falling: EventKind) -> Self {
        Self {
            degrees,
            rising,
            falling,
        }
    }

    /// Rise/Set at the geometric horizon
    pub const fn horizon() -> Self {
        Self::new(HORIZON_DEG, EventKind::Rise, EventKind::Set)
    }

    /// Dawn/Dusk at civil twilight
    pub const fn civil_twilight() -> Self {
        Self::new(CIVIL_TWILIGHT_DEG, EventKind::Dawn, EventKind::Dusk)
    }

    /// The event kind for the step from `a` to `b`, if it crosses this threshold
    #[inline]
    pub fn crossing(&self, a: f64, b: f64) -> Option<EventKind> {
        let t = self.degrees;
        if a <= t && t < b {
            Some(self.rising)
        } else if a > t && t >= b {
            Some(self.falling)
        } else {
            None
        }
    }
}

/// The horizon and civil twilight thresholds
pub fn default_thresholds() -> [Threshold; 2] {
    [Threshold::horizon(), Threshold::civil_twilight()]
}

fn scan(samples: &[PositionSample], thresholds: &[Threshold]) -> Vec<EventRecord> {
    let mut events = Vec::new();
    for pair in samples.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        for threshold in thresholds {
            if let Some(kind) = threshold.crossing(a.altitude_deg, b.altitude_deg) {
                events.push(EventRecord::new(b.key(), kind, b.azimuth_deg.trunc() as i32));
            }
        }
    }
    events
}

/// Derive the event table of `table` for the given thresholds
///
/// Deterministic: the same table and thresholds always give an identical
/// event table. Events from different thresholds are merged by a stable sort
/// on (key, kind).
pub fn derive_events(table: &PositionTable, thresholds: &[Threshold]) -> Result<EventTable> {
    let mut events = scan(table.samples(), thresholds);
    events.sort_by_key(|event| (event.key(), event.kind));

    log::debug!(
        "Derived {} {} events from {} samples",
        events.len(),
        table.body(),
        table.len()
    );
    EventTable::new(table.body(), table.observer().clone(), events)
}
