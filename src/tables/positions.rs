//! Minute-by-minute position table for one body over a canonical year

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::{binary, lower_bound, predecessor_index, MinuteKey, TableKey};
use crate::planetlib::{Body, Observer};
use crate::{AlmanacError, Result};

/// Apparent position of a body at one civil minute
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    /// Altitude in degrees, rounded to 0.1°
    pub altitude_deg: f64,
    /// Azimuth in degrees, rounded to 0.1°
    pub azimuth_deg: f64,
}

impl PositionSample {
    /// Create a sample at `key`
    pub fn new(key: MinuteKey, altitude_deg: f64, azimuth_deg: f64) -> Self {
        Self {
            month: key.month,
            day: key.day,
            hour: key.hour,
            minute: key.minute,
            altitude_deg,
            azimuth_deg,
        }
    }

    /// The civil-time key of this sample
    #[inline]
    pub fn key(&self) -> MinuteKey {
        MinuteKey::new(self.month, self.day, self.hour, self.minute)
    }

    /// Whether the body is above the horizon
    pub fn is_up(&self) -> bool {
        self.altitude_deg > 0.0
    }
}

impl fmt::Display for PositionSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Alt={:.0}° Az={:.0}°",
            self.key(),
            self.altitude_deg,
            self.azimuth_deg
        )
    }
}

/// Immutable, time-ordered positions of one body for one observer
///
/// Built once by the [`BatchBuilder`](crate::builder::BatchBuilder) and never
/// patched; a change of location or timezone means a new table.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionTable {
    body: Body,
    observer: Observer,
    canonical_year: i32,
    tz: Tz,
    samples: Vec<PositionSample>,
}

impl PositionTable {
    /// Wrap samples that are already sorted by key with no duplicates
    pub fn new(
        body: Body,
        observer: Observer,
        canonical_year: i32,
        samples: Vec<PositionSample>,
    ) -> Result<Self> {
        if let Some(pair) = samples.windows(2).find(|pair| pair[0].key() >= pair[1].key()) {
            return Err(AlmanacError::DataError(format!(
                "Position samples out of order: {} followed by {}",
                pair[0].key(),
                pair[1].key()
            )));
        }
        let tz = observer.tz()?;
        Ok(Self {
            body,
            observer,
            canonical_year,
            tz,
            samples,
        })
    }

    /// Body this table was built for
    pub fn body(&self) -> Body {
        self.body
    }

    /// Observer location and timezone used at build time
    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    /// Year whose calendar the table was computed on
    pub fn canonical_year(&self) -> i32 {
        self.canonical_year
    }

    /// Timezone the keys are expressed in
    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// All samples in key order
    pub fn samples(&self) -> &[PositionSample] {
        &self.samples
    }

    /// Number of samples in the table
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The sample with the largest key <= `key.floor()`
    ///
    /// An exact minute returns that minute's sample; a prefix such as
    /// `TableKey::from_month_day(6, 1)` returns the first sample of June 1st.
    /// Keys before the first sample fail with `NotFound`: there is no wrap
    /// around to the end of the previous year.
    pub fn at(&self, key: TableKey) -> Result<&PositionSample> {
        let floor = key.floor();
        predecessor_index(&self.samples, floor, PositionSample::key)
            .map(|index| &self.samples[index])
            .ok_or_else(|| AlmanacError::NotFound(format!("No position at or before {}", floor)))
    }

    /// Position at an absolute instant, keyed in the table's timezone
    pub fn at_instant(&self, instant: DateTime<Utc>) -> Result<&PositionSample> {
        self.at(TableKey::from_instant(instant, self.tz))
    }

    /// Position at the current wall-clock time
    pub fn now(&self) -> Result<&PositionSample> {
        self.at_instant(Utc::now())
    }

    /// Every sample of one civil day
    pub fn on_date(&self, month: u32, day: u32) -> Result<&[PositionSample]> {
        let key = TableKey::from_month_day(month, day)?;
        let start = lower_bound(&self.samples, key.floor(), PositionSample::key);
        let len = self.samples[start..]
            .iter()
            .take_while(|sample| key.matches(&sample.key()))
            .count();
        Ok(&self.samples[start..start + len])
    }

    /// Samples with keys in `[from.floor(), to.floor())`
    pub fn between(&self, from: TableKey, to: TableKey) -> &[PositionSample] {
        let start = lower_bound(&self.samples, from.floor(), PositionSample::key);
        let end = lower_bound(&self.samples, to.floor(), PositionSample::key).max(start);
        &self.samples[start..end]
    }

    /// Save the table in the binary table format
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.stage(path)?.commit()
    }

    /// Write the table next to `path`, to be committed later
    pub fn stage<P: AsRef<Path>>(&self, path: P) -> Result<binary::StagedFile> {
        binary::stage(path, |writer| binary::write_position_table(self, writer))
    }

    /// Load a table saved with [`PositionTable::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        binary::read_position_table_file(path)
    }
}

impl fmt::Display for PositionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} positions for {}: {} samples>",
            self.body,
            self.observer,
            self.samples.len()
        )
    }
}
