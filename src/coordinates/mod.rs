//! Coordinate types returned by an ephemeris, and angle wrapping helpers
//!
//! Angles on the horizon (altitude, azimuth) are carried in degrees because
//! that is what the tables store. Angles fed to the root finders are in
//! radians.

use serde::{Deserialize, Serialize};

/// Apparent position of a body on the observer's sky
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizontalPosition {
    /// Altitude above the horizon in degrees (negative below)
    pub altitude_deg: f64,
    /// Azimuth in degrees, 0..360, clockwise from north
    pub azimuth_deg: f64,
}

impl HorizontalPosition {
    /// Create a new horizontal position, normalizing azimuth into 0..360
    pub fn new(altitude_deg: f64, azimuth_deg: f64) -> Self {
        Self {
            altitude_deg,
            azimuth_deg: normalize_degrees(azimuth_deg),
        }
    }

    /// Whether the body is above the geometric horizon
    pub fn is_up(&self) -> bool {
        self.altitude_deg > 0.0
    }
}

/// Equatorial and ecliptic angles of a body at an instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngularPosition {
    /// Right ascension of date in degrees, 0..360
    pub right_ascension_deg: f64,
    /// Declination of date in degrees
    pub declination_deg: f64,
    /// Ecliptic longitude of date in degrees, 0..360
    pub ecliptic_longitude_deg: f64,
}

/// Normalize an angle in degrees into `[0, 360)`
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle in degrees into `[-180, 180)`
pub fn wrap_degrees(degrees: f64) -> f64 {
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}

/// Modulo that takes the sign of the divisor
///
/// `floor_mod(-1.0, TAU)` is in `[0, TAU)` while `floor_mod(1.0, -TAU)` is in
/// `(-TAU, 0]`, which is what a backwards search needs.
pub fn floor_mod(value: f64, divisor: f64) -> f64 {
    value - divisor * (value / divisor).floor()
}
