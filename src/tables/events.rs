//! Discrete horizon events derived from a position table

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::{binary, lower_bound, predecessor_index, MinuteKey, TableKey};
use crate::planetlib::{Body, Observer};
use crate::{AlmanacError, Result};

/// Kind of a horizon event
///
/// The declaration order breaks ties between events in the same minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Rise,
    Set,
    Dawn,
    Dusk,
}

impl EventKind {
    /// Whether this event concerns the geometric horizon
    pub fn is_horizon(&self) -> bool {
        matches!(self, EventKind::Rise | EventKind::Set)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Rise => "Rise",
            EventKind::Set => "Set",
            EventKind::Dawn => "Dawn",
            EventKind::Dusk => "Dusk",
        };
        f.write_str(name)
    }
}

/// One event at a civil minute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub kind: EventKind,
    /// Azimuth of the body at the event, truncated to whole degrees
    pub azimuth_deg: i32,
}

impl EventRecord {
    pub fn new(key: MinuteKey, kind: EventKind, azimuth_deg: i32) -> Self {
        Self {
            month: key.month,
            day: key.day,
            hour: key.hour,
            minute: key.minute,
            kind,
            azimuth_deg,
        }
    }

    #[inline]
    pub fn key(&self) -> MinuteKey {
        MinuteKey::new(self.month, self.day, self.hour, self.minute)
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02} {}", self.hour, self.minute, self.kind)?;
        if self.kind.is_horizon() {
            write!(f, " Az={}°", self.azimuth_deg)?;
        }
        Ok(())
    }
}

/// Persisted form of an [`EventTable`]
#[derive(Serialize, Deserialize)]
struct EventFile {
    body: Body,
    observer: Observer,
    events: Vec<EventRecord>,
}

/// Time-ordered horizon events of one body for one observer
#[derive(Debug, Clone, PartialEq)]
pub struct EventTable {
    body: Body,
    observer: Observer,
    tz: Tz,
    events: Vec<EventRecord>,
}

impl EventTable {
    /// Wrap events already sorted by (key, kind)
    pub fn new(body: Body, observer: Observer, events: Vec<EventRecord>) -> Result<Self> {
        if let Some(pair) = events
            .windows(2)
            .find(|pair| (pair[0].key(), pair[0].kind) > (pair[1].key(), pair[1].kind))
        {
            return Err(AlmanacError::DataError(format!(
                "Events out of order: {} {} followed by {} {}",
                pair[0].key(),
                pair[0].kind,
                pair[1].key(),
                pair[1].kind
            )));
        }
        let tz = observer.tz()?;
        Ok(Self {
            body,
            observer,
            tz,
            events,
        })
    }

    pub fn body(&self) -> Body {
        self.body
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// All events in key order
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events whose (month, day) equals the given date exactly
    pub fn on_date(&self, month: u32, day: u32) -> Result<&[EventRecord]> {
        let key = TableKey::from_month_day(month, day)?;
        let start = lower_bound(&self.events, key.floor(), EventRecord::key);
        let len = self.events[start..]
            .iter()
            .take_while(|event| key.matches(&event.key()))
            .count();
        Ok(&self.events[start..start + len])
    }

    /// Events on the civil date of `instant` in the table's timezone
    pub fn on_date_in(&self, instant: DateTime<Utc>) -> Result<&[EventRecord]> {
        let local = instant.with_timezone(&self.tz);
        self.on_date(local.month(), local.day())
    }

    /// Events on today's civil date
    pub fn today(&self) -> Result<&[EventRecord]> {
        self.on_date_in(Utc::now())
    }

    /// The last event at or before `key.floor()`
    pub fn at(&self, key: TableKey) -> Result<&EventRecord> {
        let floor = key.floor();
        predecessor_index(&self.events, floor, EventRecord::key)
            .map(|index| &self.events[index])
            .ok_or_else(|| AlmanacError::NotFound(format!("No event at or before {}", floor)))
    }

    /// The first event at or after `key.floor()`
    pub fn next_after(&self, key: TableKey) -> Result<&EventRecord> {
        let floor = key.floor();
        let index = lower_bound(&self.events, floor, EventRecord::key);
        self.events
            .get(index)
            .ok_or_else(|| AlmanacError::NotFound(format!("No event at or after {}", floor)))
    }

    /// Save the table as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.stage(path)?.commit()
    }

    /// Write the table next to `path`, to be committed later
    pub fn stage<P: AsRef<Path>>(&self, path: P) -> Result<binary::StagedFile> {
        let file = EventFile {
            body: self.body,
            observer: self.observer.clone(),
            events: self.events.clone(),
        };
        binary::stage(path, |writer| {
            serde_json::to_writer(writer, &file)?;
            Ok(())
        })
    }

    /// Load a table saved with [`EventTable::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let file: EventFile = serde_json::from_reader(reader)?;
        Self::new(file.body, file.observer, file.events)
    }
}

impl fmt::Display for EventTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} events for {}: {} events>",
            self.body,
            self.observer,
            self.events.len()
        )
    }
}
