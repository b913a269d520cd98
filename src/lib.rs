//! Sky almanac: minute-by-minute positions of the Sun, Moon and planets
//!
//! This crate precomputes the altitude and azimuth of a body for every
//! minute of a canonical year at a fixed observer, derives rise, set and
//! twilight events from that table, and refines event times to the second
//! with root finders that go back to the ephemeris.
//!
//! ```no_run
//! use sky_almanac::{AlmanacConfig, TableLoader};
//! use sky_almanac::planetlib::{AnalyticEphemeris, Body, Observer};
//! use sky_almanac::horizon::{default_thresholds, derive_events};
//!
//! # fn main() -> sky_almanac::Result<()> {
//! let observer = Observer::new(39.96, -83.0, 275.0, "America/New_York")?;
//! let config = AlmanacConfig::new(observer.clone());
//! let positions = config
//!     .builder(AnalyticEphemeris)
//!     .build(&observer, Body::Sun, config.canonical_year)?;
//! let events = derive_events(&positions, &default_thresholds())?;
//!
//! let mut loader = TableLoader::from_config(&config);
//! loader.store(positions, events)?;
//! println!("{}", loader.positions(Body::Sun)?.now()?);
//! # Ok(())
//! # }
//! ```

use chrono::NaiveDate;
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub mod almanac;
pub mod builder;
pub mod config;
pub mod constants;
pub mod coordinates;
pub mod horizon;
pub mod planetlib;
pub mod tables;
pub mod time;

// Re-export commonly used types
pub use builder::{BatchBuilder, BuildProgress};
pub use config::AlmanacConfig;
pub use planetlib::{Body, Ephemeris, Observer};
pub use tables::{EventKind, EventRecord, EventTable, MinuteKey, PositionSample, PositionTable, TableKey};

/// Main error type for the sky almanac library
#[derive(Debug, Error)]
pub enum AlmanacError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Build failed on {date}: {reason}")]
    BuildFailure { date: NaiveDate, reason: String },

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Root finder did not converge after {iterations} iterations")]
    DidNotConverge { iterations: u32 },

    #[error("No table has been built at {}", .0.display())]
    MissingStore(PathBuf),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("Time error: {0}")]
    TimeError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for almanac operations
pub type Result<T> = std::result::Result<T, AlmanacError>;

/// Loads tables from the cache directory and keeps them for reuse
///
/// Each body's tables are read from disk at most once; later calls hand out
/// the same `Arc`. Call [`TableLoader::invalidate`] after rebuilding a table
/// outside this loader.
#[derive(Debug, Default)]
pub struct TableLoader {
    cache_dir: PathBuf,
    positions: HashMap<Body, Arc<PositionTable>>,
    events: HashMap<Body, Arc<EventTable>>,
}

impl TableLoader {
    /// Create a loader reading from `cache_dir`
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Create a loader for the configured cache directory
    pub fn from_config(config: &AlmanacConfig) -> Self {
        Self::new(config.cache_dir())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn require(path: PathBuf) -> Result<PathBuf> {
        if path.is_file() {
            Ok(path)
        } else {
            Err(AlmanacError::MissingStore(path))
        }
    }

    /// The position table of `body`, loading it on first use
    pub fn positions(&mut self, body: Body) -> Result<Arc<PositionTable>> {
        if let Some(table) = self.positions.get(&body) {
            debug!("Using cached {} positions", body);
            return Ok(Arc::clone(table));
        }
        let path = Self::require(self.cache_dir.join(config::positions_file_name(body)))?;
        let table = Arc::new(PositionTable::load(&path)?);
        self.positions.insert(body, Arc::clone(&table));
        Ok(table)
    }

    /// The event table of `body`, loading it on first use
    pub fn events(&mut self, body: Body) -> Result<Arc<EventTable>> {
        if let Some(table) = self.events.get(&body) {
            debug!("Using cached {} events", body);
            return Ok(Arc::clone(table));
        }
        let path = Self::require(self.cache_dir.join(config::events_file_name(body)))?;
        let table = Arc::new(EventTable::load(&path)?);
        self.events.insert(body, Arc::clone(&table));
        Ok(table)
    }

    /// Persist freshly built tables and make them the cached copies
    pub fn store(&mut self, positions: PositionTable, events: EventTable) -> Result<()> {
        if positions.body() != events.body() {
            return Err(AlmanacError::DataError(format!(
                "Position table is for {} but event table is for {}",
                positions.body(),
                events.body()
            )));
        }
        let body = positions.body();
        // Both files are fully written before either replaces its old copy
        let staged_positions = positions.stage(self.cache_dir.join(config::positions_file_name(body)))?;
        let staged_events = events.stage(self.cache_dir.join(config::events_file_name(body)))?;
        staged_positions.commit()?;
        staged_events.commit()?;
        self.positions.insert(body, Arc::new(positions));
        self.events.insert(body, Arc::new(events));
        Ok(())
    }

    /// Drop the cached tables of `body`; the next access reads the files again
    pub fn invalidate(&mut self, body: Body) {
        self.positions.remove(&body);
        self.events.remove(&body);
    }

    pub fn invalidate_all(&mut self) {
        self.positions.clear();
        self.events.clear();
    }

    /// Whether the tables of `body` are held in memory
    pub fn is_cached(&self, body: Body) -> bool {
        self.positions.contains_key(&body) || self.events.contains_key(&body)
    }
}
