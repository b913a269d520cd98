//! Sky almanac command line tool
//!
//! Builds the minute-by-minute tables for an observer and answers questions
//! from them: where a body is now, what happens today, and when the next
//! phases, seasons and crossings occur.
//!
//! Usage:
//!   cargo run --bin almanac -- --latitude 39.96 --longitude -83.0 \
//!       --timezone America/New_York build --body sun
//!   cargo run --bin almanac -- --config almanac.json report --body sun
//!   cargo run --bin almanac -- --config almanac.json crossings --azimuth 180

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use log::info;

use sky_almanac::almanac::{
    all_moon_phases, all_seasons, current_phase_angle, find_crossings, phase_glyph,
    refine_threshold_events, CrossingTarget, Phase,
};
use sky_almanac::horizon::{default_thresholds, derive_events};
use sky_almanac::planetlib::AnalyticEphemeris;
use sky_almanac::time::{tt_to_utc, utc_to_tt};
use sky_almanac::{AlmanacConfig, Body, Observer, TableLoader};

/// Type alias for the error type used throughout this binary
type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const TIME_FORMAT: &str = "%a %-d %b %Y at %H:%M:%S %Z";

/// Sky almanac
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Minute-by-minute positions and events of the Sun, Moon and planets",
    long_about = None
)]
struct Args {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Observer latitude in degrees, north positive
    #[arg(long, global = true, allow_hyphen_values = true)]
    latitude: Option<f64>,

    /// Observer longitude in degrees, east positive
    #[arg(long, global = true, allow_hyphen_values = true)]
    longitude: Option<f64>,

    /// Observer elevation in meters
    #[arg(long, global = true, allow_hyphen_values = true)]
    elevation: Option<f64>,

    /// IANA timezone of the observer, e.g. America/New_York
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// Directory holding built tables
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build and store the position and event tables of a body
    Build {
        #[arg(long, default_value = "sun")]
        body: Body,

        /// Canonical year to build on
        #[arg(long)]
        year: Option<i32>,

        /// Worker threads
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Print the current position and today's events from the stored tables
    Report {
        #[arg(long, default_value = "sun")]
        body: Body,
    },

    /// Previous and next principal phases of the Moon
    Phases,

    /// Previous and next equinoxes and solstices
    Seasons,

    /// Precise crossings of an altitude or azimuth
    Crossings {
        #[arg(long, default_value = "sun")]
        body: Body,

        /// Altitude in degrees; without a target, horizon and twilight events are listed
        #[arg(long, conflicts_with = "azimuth", allow_hyphen_values = true)]
        altitude: Option<f64>,

        /// Azimuth in degrees
        #[arg(long)]
        azimuth: Option<f64>,

        /// Days to search from now
        #[arg(long, default_value_t = 1.0)]
        days: f64,
    },
}

/// Merge the configuration file with command line overrides
fn resolve_config(args: &Args) -> Result<AlmanacConfig> {
    let mut config = match &args.config {
        Some(path) => AlmanacConfig::load(path)?,
        None => {
            let (Some(latitude), Some(longitude)) = (args.latitude, args.longitude) else {
                return Err("Provide --config or both --latitude and --longitude".into());
            };
            let timezone = args.timezone.as_deref().unwrap_or("UTC");
            AlmanacConfig::new(Observer::new(
                latitude,
                longitude,
                args.elevation.unwrap_or(0.0),
                timezone,
            )?)
        }
    };

    let o = &config.observer;
    config.observer = Observer::new(
        args.latitude.unwrap_or(o.latitude_deg),
        args.longitude.unwrap_or(o.longitude_deg),
        args.elevation.unwrap_or(o.elevation_m),
        args.timezone.as_deref().unwrap_or(&o.timezone),
    )?;
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    Ok(config)
}

fn local(instant: f64, tz: Tz) -> Result<String> {
    let utc: DateTime<Utc> = tt_to_utc(instant)?;
    Ok(utc.with_timezone(&tz).format(TIME_FORMAT).to_string())
}

fn build(mut config: AlmanacConfig, body: Body, year: Option<i32>, workers: Option<usize>) -> Result<()> {
    if let Some(year) = year {
        config.canonical_year = year;
    }
    if workers.is_some() {
        config.workers = workers;
    }

    let builder = config.builder(AnalyticEphemeris).with_progress(|progress| {
        if progress.completed % 30 == 0 || progress.completed == progress.total {
            info!("{}/{} days computed", progress.completed, progress.total);
        }
    });
    let positions = builder.build(&config.observer, body, config.canonical_year)?;
    let events = derive_events(&positions, &default_thresholds())?;

    let mut loader = TableLoader::from_config(&config);
    println!("{}", positions);
    println!("{}", events);
    loader.store(positions, events)?;
    println!("Tables written to {}", loader.cache_dir().display());
    Ok(())
}

fn report(config: &AlmanacConfig, body: Body) -> Result<()> {
    let mut loader = TableLoader::from_config(config);
    let positions = loader.positions(body)?;
    let events = loader.events(body)?;

    let now = positions.now()?;
    println!("{} at {}", body, now);
    if now.is_up() {
        println!("Above the horizon");
    } else {
        println!("Below the horizon");
    }

    println!("Today:");
    for event in events.today()? {
        println!("  {}", event);
    }
    Ok(())
}

fn phases(config: &AlmanacConfig) -> Result<()> {
    let tz = config.observer.tz()?;
    let now = utc_to_tt(Utc::now());
    let ephemeris = AnalyticEphemeris;

    let angle = current_phase_angle(&ephemeris, &config.observer, now)?;
    println!(
        "Phase: {:3.0}° {}  (after {}, before {})",
        angle,
        phase_glyph(angle),
        Phase::preceding(angle),
        Phase::following(angle)
    );
    for event in all_moon_phases(&ephemeris, &config.observer, now)? {
        println!("{:18} {}", event.which.to_string(), local(event.instant, tz)?);
    }
    Ok(())
}

fn seasons(config: &AlmanacConfig) -> Result<()> {
    let tz = config.observer.tz()?;
    let now = utc_to_tt(Utc::now());
    for event in all_seasons(&AnalyticEphemeris, &config.observer, now)? {
        println!("{:18} {}", event.which.to_string(), local(event.instant, tz)?);
    }
    Ok(())
}

fn crossings(
    config: &AlmanacConfig,
    body: Body,
    altitude: Option<f64>,
    azimuth: Option<f64>,
    days: f64,
) -> Result<()> {
    let tz = config.observer.tz()?;
    let now = utc_to_tt(Utc::now());
    let ephemeris = AnalyticEphemeris;

    let target = match (altitude, azimuth) {
        (Some(degrees), _) => CrossingTarget::Altitude(degrees),
        (None, Some(degrees)) => CrossingTarget::Azimuth(degrees),
        (None, None) => {
            for event in
                refine_threshold_events(&ephemeris, &config.observer, body, now, days, &default_thresholds())?
            {
                println!(
                    "{:8} {:4} {:5.1}° {}",
                    body.name(),
                    event.kind.to_string(),
                    event.azimuth_deg,
                    local(event.instant, tz)?
                );
            }
            return Ok(());
        }
    };

    for crossing in find_crossings(&ephemeris, &config.observer, body, now, days, target)? {
        println!(
            "{:8} {:7} Alt={:5.1}° Az={:5.1}° {}",
            body.name(),
            if crossing.rising { "rising" } else { "falling" },
            crossing.position.altitude_deg,
            crossing.position.azimuth_deg,
            local(crossing.instant, tz)?
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    match args.command {
        Command::Build {
            body,
            year,
            workers,
        } => build(config, body, year, workers),
        Command::Report { body } => report(&config, body),
        Command::Phases => phases(&config),
        Command::Seasons => seasons(&config),
        Command::Crossings {
            body,
            altitude,
            azimuth,
            days,
        } => crossings(&config, body, altitude, azimuth, days),
    }
}
