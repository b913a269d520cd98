//! Minute-resolution position tables and the horizon event tables derived from them
//!
//! Both tables are sorted sequences keyed by local civil
//! `(month, day, hour, minute)`. The year is deliberately absent from the
//! key: a table built for one canonical year is reused for any calendar year.
//!
//! Queries take a [`TableKey`], which may omit trailing fields. Missing
//! fields resolve to their minimum (day 1, hour 0, minute 0), so
//! `TableKey::from_prefix(6)` means "June 1st, 00:00".

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AlmanacError, Result};

pub mod binary;
pub mod events;
pub mod positions;

pub use events::{EventKind, EventRecord, EventTable};
pub use positions::{PositionSample, PositionTable};

/// Fully resolved civil-time key shared by every stored record
///
/// Ordering is lexicographic over (month, day, hour, minute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MinuteKey {
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl MinuteKey {
    /// Create a key without validation (callers that produce keys from chrono values)
    pub const fn new(month: u8, day: u8, hour: u8, minute: u8) -> Self {
        Self {
            month,
            day,
            hour,
            minute,
        }
    }

    /// Key of a local civil datetime
    pub fn from_civil(local: &NaiveDateTime) -> Self {
        Self::new(
            local.month() as u8,
            local.day() as u8,
            local.hour() as u8,
            local.minute() as u8,
        )
    }

    /// Attach a year to this key
    ///
    /// Fails for Feb 29 in a common year.
    pub fn in_year(&self, year: i32) -> Result<NaiveDateTime> {
        NaiveDate::from_ymd_opt(year, self.month as u32, self.day as u32)
            .and_then(|date| date.and_hms_opt(self.hour as u32, self.minute as u32, 0))
            .ok_or_else(|| AlmanacError::InvalidKey(format!("{} does not exist in {}", self, year)))
    }
}

impl fmt::Display for MinuteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}-{:02} {:02}:{:02}",
            self.month, self.day, self.hour, self.minute
        )
    }
}

/// A possibly partial query key
///
/// Fields are ordered: an hour can only be given together with a day, and a
/// minute only together with an hour. The named constructors enforce this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableKey {
    month: u8,
    day: Option<u8>,
    hour: Option<u8>,
    minute: Option<u8>,
}

fn check_range(name: &str, value: u32, low: u32, high: u32) -> Result<u8> {
    if (low..=high).contains(&value) {
        Ok(value as u8)
    } else {
        Err(AlmanacError::InvalidKey(format!(
            "{} {} is outside {}..={}",
            name, value, low, high
        )))
    }
}

impl TableKey {
    /// Every record of `month`
    pub fn from_prefix(month: u32) -> Result<Self> {
        Ok(Self {
            month: check_range("month", month, 1, 12)?,
            day: None,
            hour: None,
            minute: None,
        })
    }

    /// Every record of one civil day
    pub fn from_month_day(month: u32, day: u32) -> Result<Self> {
        Ok(Self {
            day: Some(check_range("day", day, 1, 31)?),
            ..Self::from_prefix(month)?
        })
    }

    /// A single minute
    pub fn from_parts(month: u32, day: u32, hour: u32, minute: u32) -> Result<Self> {
        Ok(Self {
            hour: Some(check_range("hour", hour, 0, 23)?),
            minute: Some(check_range("minute", minute, 0, 59)?),
            ..Self::from_month_day(month, day)?
        })
    }

    /// The civil day of a calendar date
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            month: date.month() as u8,
            day: Some(date.day() as u8),
            hour: None,
            minute: None,
        }
    }

    /// The minute containing a local civil datetime
    pub fn from_datetime(local: NaiveDateTime) -> Self {
        let key = MinuteKey::from_civil(&local);
        Self::from(key)
    }

    /// The minute containing an absolute instant, seen in timezone `tz`
    pub fn from_instant(instant: DateTime<Utc>, tz: Tz) -> Self {
        Self::from_datetime(instant.with_timezone(&tz).naive_local())
    }

    /// Resolve missing trailing fields to their minimum
    pub fn floor(&self) -> MinuteKey {
        MinuteKey::new(
            self.month,
            self.day.unwrap_or(1),
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
        )
    }

    /// Whether `key` shares every field this key specifies
    pub fn matches(&self, key: &MinuteKey) -> bool {
        self.month == key.month
            && self.day.map_or(true, |d| d == key.day)
            && self.hour.map_or(true, |h| h == key.hour)
            && self.minute.map_or(true, |m| m == key.minute)
    }
}

impl From<MinuteKey> for TableKey {
    fn from(key: MinuteKey) -> Self {
        Self {
            month: key.month,
            day: Some(key.day),
            hour: Some(key.hour),
            minute: Some(key.minute),
        }
    }
}

/// Index of the last record whose key is <= `key`, if any
///
/// `records` must be sorted by key. This is the predecessor search both tables use.
pub(crate) fn predecessor_index<T>(records: &[T], key: MinuteKey, key_of: impl Fn(&T) -> MinuteKey) -> Option<usize> {
    let upper = records.partition_point(|record| key_of(record) <= key);
    upper.checked_sub(1)
}

/// Index of the first record whose key is >= `key`
pub(crate) fn lower_bound<T>(records: &[T], key: MinuteKey, key_of: impl Fn(&T) -> MinuteKey) -> usize {
    records.partition_point(|record| key_of(record) < key)
}
