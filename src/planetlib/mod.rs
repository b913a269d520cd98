//! Bodies, observers, and the ephemeris port
//!
//! The almanac never computes orbital mechanics itself. Everything that needs
//! a position goes through the [`Ephemeris`] trait, which answers "where is
//! this body, seen from this observer, at this TT instant". A small analytic
//! Sun/Moon model is provided so the crate is usable without kernel files.

use chrono_tz::Tz;
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{DEG2RAD, J2000, RAD2DEG};
use crate::coordinates::{normalize_degrees, AngularPosition, HorizontalPosition};
use crate::time::tt_to_ut1;
use crate::{AlmanacError, Result};

/// Enum representing the solar system bodies an almanac can be built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Body {
    Sun,
    Moon,
    Mercury,
    Venus,
    Mars,
    Jupiter,
    Saturn,
}

impl Body {
    /// Get the body's name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Body::Sun => "Sun",
            Body::Moon => "Moon",
            Body::Mercury => "Mercury",
            Body::Venus => "Venus",
            Body::Mars => "Mars",
            Body::Jupiter => "Jupiter",
            Body::Saturn => "Saturn",
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Body {
    type Err = AlmanacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sun" => Ok(Body::Sun),
            "moon" => Ok(Body::Moon),
            "mercury" => Ok(Body::Mercury),
            "venus" => Ok(Body::Venus),
            "mars" => Ok(Body::Mars),
            "jupiter" => Ok(Body::Jupiter),
            "saturn" => Ok(Body::Saturn),
            _ => Err(AlmanacError::ObjectNotFound(s.to_string())),
        }
    }
}

/// A fixed observer on the Earth's surface, with the timezone its tables use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    /// Geodetic latitude in degrees, north positive
    pub latitude_deg: f64,
    /// Longitude in degrees, east positive
    pub longitude_deg: f64,
    /// Elevation above sea level in meters
    pub elevation_m: f64,
    /// IANA timezone identifier, e.g. "America/New_York"
    pub timezone: String,
}

impl Observer {
    /// Create an observer, validating the coordinates and timezone identifier
    pub fn new(latitude_deg: f64, longitude_deg: f64, elevation_m: f64, timezone: &str) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude_deg) {
            return Err(AlmanacError::DataError(format!(
                "Latitude {} is outside -90..90",
                latitude_deg
            )));
        }
        if !(-180.0..=180.0).contains(&longitude_deg) {
            return Err(AlmanacError::DataError(format!(
                "Longitude {} is outside -180..180",
                longitude_deg
            )));
        }
        let observer = Self {
            latitude_deg,
            longitude_deg,
            elevation_m,
            timezone: timezone.to_string(),
        };
        observer.tz()?;
        Ok(observer)
    }

    /// Parse the observer's timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| AlmanacError::InvalidTimezone(format!("{}: {}", self.timezone, e)))
    }
}

impl fmt::Display for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lat {:.2}°, Lon {:.2}°, {:.0} m ({})",
            self.latitude_deg, self.longitude_deg, self.elevation_m, self.timezone
        )
    }
}

/// Source of apparent positions for a body at an instant
///
/// All instants are Terrestrial Time Julian dates. Implementations must be
/// pure functions of their arguments; the builder calls them from many
/// threads at once.
pub trait Ephemeris {
    /// Apparent altitude and azimuth of `body` as seen by `observer`
    fn observe(&self, tt: f64, observer: &Observer, body: Body) -> Result<HorizontalPosition>;

    /// Right ascension, declination and ecliptic longitude of `body`
    fn observe_angle(&self, tt: f64, observer: &Observer, body: Body) -> Result<AngularPosition>;

    /// Batched form of [`Ephemeris::observe`]
    ///
    /// The default evaluates each instant in turn; vectorized backends
    /// should override it.
    fn observe_many(
        &self,
        tts: &[f64],
        observer: &Observer,
        body: Body,
    ) -> Result<Vec<HorizontalPosition>> {
        tts.iter()
            .map(|&tt| self.observe(tt, observer, body))
            .collect()
    }
}

impl<E: Ephemeris + ?Sized> Ephemeris for &E {
    fn observe(&self, tt: f64, observer: &Observer, body: Body) -> Result<HorizontalPosition> {
        (**self).observe(tt, observer, body)
    }

    fn observe_angle(&self, tt: f64, observer: &Observer, body: Body) -> Result<AngularPosition> {
        (**self).observe_angle(tt, observer, body)
    }

    fn observe_many(
        &self,
        tts: &[f64],
        observer: &Observer,
        body: Body,
    ) -> Result<Vec<HorizontalPosition>> {
        (**self).observe_many(tts, observer, body)
    }
}

/// Geocentric ecliptic coordinates of date, in degrees
#[derive(Debug, Clone, Copy)]
struct Ecliptic {
    longitude: f64,
    latitude: f64,
    /// Equatorial horizontal parallax
    parallax: f64,
}

/// Low-precision analytic Sun and Moon
///
/// Uses the low-precision formulas of the Astronomical Almanac: about 0.01°
/// for the Sun and 0.3° for the Moon between 1950 and 2050. Refraction is
/// ignored, matching the tables this crate builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyticEphemeris;

impl AnalyticEphemeris {
    /// Create the analytic ephemeris
    pub fn new() -> Self {
        Self
    }

    fn sun(tt: f64) -> Ecliptic {
        let n = tt - J2000;
        let mean_longitude = 280.460 + 0.985_647_4 * n;
        let g = (357.528 + 0.985_600_3 * n) * DEG2RAD;
        Ecliptic {
            longitude: normalize_degrees(mean_longitude + 1.915 * g.sin() + 0.020 * (2.0 * g).sin()),
            latitude: 0.0,
            parallax: 0.0024,
        }
    }

    fn moon(tt: f64) -> Ecliptic {
        let t = (tt - J2000) / 36_525.0;
        let s = |a: f64, b: f64| ((a + b * t) * DEG2RAD).sin();
        let c = |a: f64, b: f64| ((a + b * t) * DEG2RAD).cos();

        let longitude = 218.32 + 481_267.881 * t + 6.29 * s(135.0, 477_198.87)
            - 1.27 * s(259.3, -413_335.36)
            + 0.66 * s(235.7, 890_534.22)
            + 0.21 * s(269.9, 954_397.74)
            - 0.19 * s(357.5, 35_999.05)
            - 0.11 * s(186.5, 966_404.03);
        let latitude = 5.13 * s(93.3, 483_202.02) + 0.28 * s(228.2, 960_400.89)
            - 0.28 * s(318.3, 6_003.15)
            - 0.17 * s(217.6, -407_332.21);
        let parallax = 0.9508
            + 0.0518 * c(135.0, 477_198.87)
            + 0.0095 * c(259.3, -413_335.36)
            + 0.0078 * c(235.7, 890_534.22)
            + 0.0028 * c(269.9, 954_397.74);

        Ecliptic {
            longitude: normalize_degrees(longitude),
            latitude,
            parallax,
        }
    }

    fn ecliptic(tt: f64, body: Body) -> Result<Ecliptic> {
        match body {
            Body::Sun => Ok(Self::sun(tt)),
            Body::Moon => Ok(Self::moon(tt)),
            other => Err(AlmanacError::ObjectNotFound(format!(
                "{} is not covered by the analytic ephemeris",
                other
            ))),
        }
    }

    /// Mean obliquity of the ecliptic in degrees
    fn obliquity(tt: f64) -> f64 {
        23.439 - 0.000_000_4 * (tt - J2000)
    }

    /// Rotate ecliptic coordinates into (right ascension, declination), degrees
    fn to_equatorial(ecliptic: &Ecliptic, obliquity_deg: f64) -> (f64, f64) {
        let lon = ecliptic.longitude * DEG2RAD;
        let lat = ecliptic.latitude * DEG2RAD;
        let direction = Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin());
        let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), obliquity_deg * DEG2RAD);
        let eq = rotation * direction;

        let ra = normalize_degrees(eq.y.atan2(eq.x) * RAD2DEG);
        let dec = eq.z.clamp(-1.0, 1.0).asin() * RAD2DEG;
        (ra, dec)
    }

    /// Greenwich mean sidereal time in degrees
    fn gmst(tt: f64) -> f64 {
        normalize_degrees(280.460_618_37 + 360.985_647_366_29 * (tt_to_ut1(tt) - J2000))
    }
}

impl Ephemeris for AnalyticEphemeris {
    fn observe(&self, tt: f64, observer: &Observer, body: Body) -> Result<HorizontalPosition> {
        let ecliptic = Self::ecliptic(tt, body)?;
        let (ra, dec) = Self::to_equatorial(&ecliptic, Self::obliquity(tt));

        let hour_angle = (Self::gmst(tt) + observer.longitude_deg - ra) * DEG2RAD;
        let lat = observer.latitude_deg * DEG2RAD;
        let dec = dec * DEG2RAD;

        let sin_alt = lat.sin() * dec.sin() + lat.cos() * dec.cos() * hour_angle.cos();
        let geocentric_alt = sin_alt.clamp(-1.0, 1.0).asin();
        let azimuth = (-hour_angle.sin() * dec.cos())
            .atan2(dec.sin() * lat.cos() - dec.cos() * lat.sin() * hour_angle.cos());

        // Parallax in altitude, which matters for the Moon only
        let altitude = geocentric_alt * RAD2DEG - ecliptic.parallax * geocentric_alt.cos();

        Ok(HorizontalPosition::new(altitude, azimuth * RAD2DEG))
    }

    fn observe_angle(&self, tt: f64, _observer: &Observer, body: Body) -> Result<AngularPosition> {
        let ecliptic = Self::ecliptic(tt, body)?;
        let (ra, dec) = Self::to_equatorial(&ecliptic, Self::obliquity(tt));
        Ok(AngularPosition {
            right_ascension_deg: ra,
            declination_deg: dec,
            ecliptic_longitude_deg: ecliptic.longitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::wrap_degrees;
    use crate::time::utc_to_tt;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn greenwich() -> Observer {
        Observer::new(40.0, 0.0, 0.0, "UTC").unwrap()
    }

    #[test]
    fn test_body_from_str() {
        assert_eq!("moon".parse::<Body>().unwrap(), Body::Moon);
        assert_eq!("Sun".parse::<Body>().unwrap(), Body::Sun);
        assert!(matches!(
            "pluto".parse::<Body>(),
            Err(AlmanacError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_observer_rejects_bad_timezone() {
        let result = Observer::new(40.0, -83.0, 250.0, "Mars/Olympus_Mons");
        assert!(matches!(result, Err(AlmanacError::InvalidTimezone(_))));
        assert!(Observer::new(95.0, 0.0, 0.0, "UTC").is_err());
    }

    #[test]
    fn test_sun_longitude_at_june_solstice() {
        // 2024 June solstice: 2024-06-20 20:51 UTC
        let tt = utc_to_tt(Utc.with_ymd_and_hms(2024, 6, 20, 20, 51, 0).unwrap());
        let angles = AnalyticEphemeris.observe_angle(tt, &greenwich(), Body::Sun).unwrap();
        assert_relative_eq!(angles.ecliptic_longitude_deg, 90.0, epsilon = 0.05);
        assert_relative_eq!(angles.declination_deg, 23.44, epsilon = 0.05);
    }

    #[test]
    fn test_full_moon_elongation() {
        // Full Moon: 2024-01-25 17:54 UTC
        let tt = utc_to_tt(Utc.with_ymd_and_hms(2024, 1, 25, 17, 54, 0).unwrap());
        let observer = greenwich();
        let sun = AnalyticEphemeris.observe_angle(tt, &observer, Body::Sun).unwrap();
        let moon = AnalyticEphemeris.observe_angle(tt, &observer, Body::Moon).unwrap();
        let elongation = wrap_degrees(moon.ecliptic_longitude_deg - sun.ecliptic_longitude_deg);
        assert!(elongation.abs() > 179.0, "elongation {}", elongation);
    }

    #[test]
    fn test_sun_near_meridian_at_noon() {
        // Latitude 40N at Greenwich near the June solstice: altitude ~73.4° due south
        let tt = utc_to_tt(Utc.with_ymd_and_hms(2024, 6, 21, 12, 2, 0).unwrap());
        let pos = AnalyticEphemeris.observe(tt, &greenwich(), Body::Sun).unwrap();
        assert_relative_eq!(pos.altitude_deg, 73.4, epsilon = 0.5);
        assert_relative_eq!(pos.azimuth_deg, 180.0, epsilon = 5.0);
    }

    #[test]
    fn test_unsupported_body() {
        let result = AnalyticEphemeris.observe(J2000, &greenwich(), Body::Jupiter);
        assert!(matches!(result, Err(AlmanacError::ObjectNotFound(_))));
    }

    #[test]
    fn test_observe_many_matches_observe() {
        let observer = greenwich();
        let tts = [J2000, J2000 + 0.25, J2000 + 0.5];
        let many = AnalyticEphemeris
            .observe_many(&tts, &observer, Body::Moon)
            .unwrap();
        for (tt, pos) in tts.iter().zip(many) {
            assert_eq!(pos, AnalyticEphemeris.observe(*tt, &observer, Body::Moon).unwrap());
        }
    }
}
