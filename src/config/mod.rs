//! Almanac configuration and cache layout
//!
//! A configuration is a small JSON document:
//!
//! ```json
//! {
//!   "observer": {
//!     "latitude_deg": 39.96, "longitude_deg": -83.0,
//!     "elevation_m": 275.0, "timezone": "America/New_York"
//!   },
//!   "canonical_year": 2024,
//!   "workers": 8,
//!   "max_retries": 1
//! }
//! ```
//!
//! Built tables live in a cache directory, one file per body and table kind.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::builder::BatchBuilder;
use crate::constants::DEFAULT_CANONICAL_YEAR;
use crate::planetlib::{Body, Ephemeris, Observer};
use crate::tables::binary::write_atomically;
use crate::Result;

/// Environment variable overriding the default cache directory
pub const CACHE_ENV_VAR: &str = "SKY_ALMANAC_CACHE";

fn default_canonical_year() -> i32 {
    DEFAULT_CANONICAL_YEAR
}

/// Settings shared by the builder, the loader and the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlmanacConfig {
    pub observer: Observer,
    /// Year whose calendar tables are built on; a leap year covers Feb 29
    #[serde(default = "default_canonical_year")]
    pub canonical_year: i32,
    /// Worker pool size, defaults to the available parallelism
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Retries per failed day during a build
    #[serde(default)]
    pub max_retries: u32,
}

impl AlmanacConfig {
    pub fn new(observer: Observer) -> Self {
        Self {
            observer,
            canonical_year: DEFAULT_CANONICAL_YEAR,
            workers: None,
            cache_dir: None,
            max_retries: 0,
        }
    }

    /// Load a configuration file, validating the observer
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: AlmanacConfig = serde_json::from_reader(reader)?;
        let o = &config.observer;
        Observer::new(o.latitude_deg, o.longitude_deg, o.elevation_m, &o.timezone)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomically(path, |writer| {
            serde_json::to_writer_pretty(writer, self)?;
            Ok(())
        })
    }

    /// Directory holding the built tables
    pub fn cache_dir(&self) -> PathBuf {
        resolve_cache_dir(
            self.cache_dir.as_deref(),
            env::var(CACHE_ENV_VAR).ok(),
            env::var("HOME").ok(),
        )
    }

    /// Path of the position table of `body`
    pub fn positions_path(&self, body: Body) -> PathBuf {
        self.cache_dir().join(positions_file_name(body))
    }

    /// Path of the event table of `body`
    pub fn events_path(&self, body: Body) -> PathBuf {
        self.cache_dir().join(events_file_name(body))
    }

    /// A batch builder with this configuration's pool size and retry policy
    pub fn builder<E: Ephemeris + Sync>(&self, ephemeris: E) -> BatchBuilder<E> {
        let builder = BatchBuilder::new(ephemeris).with_max_retries(self.max_retries);
        match self.workers {
            Some(workers) => builder.with_workers(workers),
            None => builder,
        }
    }
}

/// Cache directory from, in order: an explicit path, the override variable,
/// or `$HOME/.cache/sky-almanac`
pub fn resolve_cache_dir(explicit: Option<&Path>, env_override: Option<String>, home: Option<String>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(dir) = env_override.filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    let home = home.unwrap_or_else(|| ".".to_string());
    PathBuf::from(home).join(".cache").join("sky-almanac")
}

pub fn positions_file_name(body: Body) -> String {
    format!("{}-Minute-by-Minute.bin", body.name())
}

pub fn events_file_name(body: Body) -> String {
    format!("{}-Horizon-Events.json", body.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlmanacError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let json = r#"{
            "observer": {
                "latitude_deg": 39.96,
                "longitude_deg": -83.0,
                "elevation_m": 275.0,
                "timezone": "America/New_York"
            }
        }"#;
        let config: AlmanacConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.canonical_year, 2024);
        assert_eq!(config.workers, None);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_load_rejects_bad_timezone() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("almanac.json");
        fs::write(
            &path,
            r#"{"observer": {"latitude_deg": 0, "longitude_deg": 0, "elevation_m": 0, "timezone": "Nowhere/Land"}}"#,
        )
        .unwrap();
        assert!(matches!(
            AlmanacConfig::load(&path),
            Err(AlmanacError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("almanac.json");
        let mut config = AlmanacConfig::new(Observer::new(51.48, 0.0, 46.0, "Europe/London").unwrap());
        config.workers = Some(3);
        config.cache_dir = Some(temp_dir.path().join("tables"));
        config.save(&path).unwrap();
        assert_eq!(AlmanacConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_cache_dir_resolution_order() {
        let explicit = PathBuf::from("/data/tables");
        assert_eq!(
            resolve_cache_dir(Some(&explicit), Some("/env".into()), Some("/home/me".into())),
            explicit
        );
        assert_eq!(
            resolve_cache_dir(None, Some("/env".into()), Some("/home/me".into())),
            PathBuf::from("/env")
        );
        assert_eq!(
            resolve_cache_dir(None, Some(String::new()), Some("/home/me".into())),
            PathBuf::from("/home/me/.cache/sky-almanac")
        );
        assert_eq!(resolve_cache_dir(None, None, None), PathBuf::from("./.cache/sky-almanac"));
    }

    #[test]
    fn test_table_paths() {
        let mut config = AlmanacConfig::new(Observer::new(40.0, -83.0, 0.0, "UTC").unwrap());
        config.cache_dir = Some(PathBuf::from("/tmp/almanac"));
        assert_eq!(
            config.positions_path(Body::Moon),
            PathBuf::from("/tmp/almanac/Moon-Minute-by-Minute.bin")
        );
        assert_eq!(
            config.events_path(Body::Sun),
            PathBuf::from("/tmp/almanac/Sun-Horizon-Events.json")
        );
    }

    #[test]
    fn test_builder_uses_worker_count() {
        let mut config = AlmanacConfig::new(Observer::new(40.0, -83.0, 0.0, "UTC").unwrap());
        config.workers = Some(3);
        let builder = config.builder(crate::planetlib::AnalyticEphemeris);
        assert_eq!(builder.workers(), 3);
    }
}
