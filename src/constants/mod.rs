//! Constants module for almanac calculations

use std::f64::consts::PI;

// Time constants
/// Seconds in a day
pub const DAY_S: f64 = 86_400.0;
/// One hour as a fraction of a day
pub const HOUR: f64 = 1.0 / 24.0;
/// One minute as a fraction of a day
pub const MINUTE: f64 = HOUR / 60.0;
/// Minutes in a civil day
pub const MINUTES_PER_DAY: u32 = 1440;
/// J2000.0 epoch as Julian date
pub const J2000: f64 = 2_451_545.0;
/// Julian date of the Unix epoch (1970-01-01T00:00:00)
pub const UNIX_EPOCH_JD: f64 = 2_440_587.5;
/// TT minus TAI in seconds
pub const TT_MINUS_TAI_S: f64 = 32.184;

// Angles
/// Degrees to radians conversion factor
pub const DEG2RAD: f64 = PI / 180.0;
/// Radians to degrees conversion factor
pub const RAD2DEG: f64 = 180.0 / PI;
/// Tau (2*PI) for full circle
pub const TAU: f64 = 2.0 * PI;
/// One arcsecond in radians
pub const ARCSECOND: f64 = DEG2RAD / 3600.0;
/// Angles smaller than this are treated as "already there" when seeding a search
pub const TINY_ANGLE: f64 = ARCSECOND / 360.0;

// Periods used to seed root-finding
/// Mean synodic month in days
pub const SYNODIC_MONTH: f64 = 29.53;
/// Mean year length used to seed season searches, in days
pub const TROPICAL_YEAR: f64 = 365.25;

// Horizon thresholds
/// Altitude of the geometric horizon in degrees
pub const HORIZON_DEG: f64 = 0.0;
/// Altitude of the Sun at civil dawn and dusk in degrees
pub const CIVIL_TWILIGHT_DEG: f64 = -6.0;

// Root finding
/// Default precision of the refiners: one-twentieth of a minute, in days
pub const DEFAULT_PRECISION: f64 = MINUTE / 20.0;
/// Iteration cap for the secant refiner
pub const SECANT_MAX_ITERATIONS: u32 = 50;
/// Iteration cap for Brent's method
pub const BRENT_MAX_ITERATIONS: u32 = 100;

// Calendar constants
/// Default canonical year for position tables (a leap year, so Feb 29 exists)
pub const DEFAULT_CANONICAL_YEAR: i32 = 2024;
