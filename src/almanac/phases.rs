//! Lunar phases and seasons
//!
//! Both are moments when an ecliptic longitude reaches a target angle: the
//! Moon's elongation from the Sun for phases, the Sun's own longitude for
//! equinoxes and solstices. The search is seeded from the mean period and
//! finished with a secant iteration on the wrapped residual.

use chrono::{DateTime, Utc};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;

use super::solvers::secant;
use crate::constants::{DEFAULT_PRECISION, DEG2RAD, HOUR, SYNODIC_MONTH, TAU, TINY_ANGLE, TROPICAL_YEAR};
use crate::coordinates::{floor_mod, normalize_degrees};
use crate::planetlib::{Body, Ephemeris, Observer};
use crate::time::tt_to_utc;
use crate::Result;

/// Direction of a periodic search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motion {
    Previous,
    Next,
}

impl Motion {
    pub const ALL: [Motion; 2] = [Motion::Previous, Motion::Next];

    /// Angle swept by one full cycle in this direction
    pub fn sweep(&self) -> f64 {
        match self {
            Motion::Previous => -TAU,
            Motion::Next => TAU,
        }
    }
}

/// Principal phases of the Moon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    NewMoon,
    FirstQuarter,
    FullMoon,
    LastQuarter,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::NewMoon,
        Phase::FirstQuarter,
        Phase::FullMoon,
        Phase::LastQuarter,
    ];

    /// Elongation of the Moon from the Sun at this phase, radians
    pub fn target(&self) -> f64 {
        match self {
            Phase::NewMoon => 0.0,
            Phase::FirstQuarter => FRAC_PI_2,
            Phase::FullMoon => PI,
            Phase::LastQuarter => PI + FRAC_PI_2,
        }
    }

    /// The next principal phase after an elongation in degrees
    pub fn following(elongation_deg: f64) -> Phase {
        let quadrant = (normalize_degrees(elongation_deg) / 90.0).floor() as usize;
        Self::ALL[(quadrant + 1) % 4]
    }

    /// The principal phase most recently passed at an elongation in degrees
    pub fn preceding(elongation_deg: f64) -> Phase {
        let quadrant = (normalize_degrees(elongation_deg) / 90.0).floor() as usize;
        Self::ALL[quadrant % 4]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::NewMoon => "New Moon",
            Phase::FirstQuarter => "First Quarter",
            Phase::FullMoon => "Full Moon",
            Phase::LastQuarter => "Last Quarter",
        };
        f.write_str(name)
    }
}

/// Seasons of the northern hemisphere, by the Sun's ecliptic longitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Spring, Season::Summer, Season::Fall, Season::Winter];

    /// Ecliptic longitude of the Sun when this season starts, radians
    pub fn target(&self) -> f64 {
        match self {
            Season::Spring => 0.0,
            Season::Summer => FRAC_PI_2,
            Season::Fall => PI,
            Season::Winter => PI + FRAC_PI_2,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
            Season::Winter => "Winter",
        };
        f.write_str(name)
    }
}

/// What a [`MotionEvent`] marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    Phase(Phase),
    Season(Season),
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occurrence::Phase(phase) => fmt::Display::fmt(phase, f),
            Occurrence::Season(season) => fmt::Display::fmt(season, f),
        }
    }
}

/// A refined phase or season instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEvent {
    /// TT Julian date
    pub instant: f64,
    pub which: Occurrence,
    pub motion: Motion,
}

impl MotionEvent {
    pub fn utc(&self) -> Result<DateTime<Utc>> {
        tt_to_utc(self.instant)
    }
}

/// Search for the moment `angle(t)` reaches `target`
///
/// The residual is wrapped into `[-π, π)` so it is continuous around the
/// target. The seed assumes `angle` advances uniformly by one turn per
/// `period` days.
fn find_periodic<F>(mut angle: F, tt: f64, motion: Motion, target: f64, period: f64) -> Result<f64>
where
    F: FnMut(f64) -> Result<f64>,
{
    let antitarget = target + PI;
    let mut residual = move |t: f64| -> Result<f64> { Ok(floor_mod(angle(t)? - antitarget, TAU) - PI) };

    let f0 = residual(tt)?;
    let mut to_cover = floor_mod(-f0, motion.sweep());
    if to_cover.abs() < TINY_ANGLE {
        to_cover = motion.sweep();
    }
    let estimate = tt + period * to_cover / TAU;
    secant(residual, estimate, estimate + HOUR, DEFAULT_PRECISION)
}

/// Elongation of the Moon from the Sun in ecliptic longitude, radians
fn elongation<E: Ephemeris>(ephemeris: &E, observer: &Observer, tt: f64) -> Result<f64> {
    let sun = ephemeris.observe_angle(tt, observer, Body::Sun)?;
    let moon = ephemeris.observe_angle(tt, observer, Body::Moon)?;
    Ok((moon.ecliptic_longitude_deg - sun.ecliptic_longitude_deg) * DEG2RAD)
}

/// The previous or next instant of `phase` from `tt`
pub fn find_moon_phase<E: Ephemeris>(
    ephemeris: &E,
    observer: &Observer,
    tt: f64,
    motion: Motion,
    phase: Phase,
) -> Result<f64> {
    find_periodic(
        |t| elongation(ephemeris, observer, t),
        tt,
        motion,
        phase.target(),
        SYNODIC_MONTH,
    )
}

/// The previous or next start of `season` from `tt`
pub fn find_season<E: Ephemeris>(
    ephemeris: &E,
    observer: &Observer,
    tt: f64,
    motion: Motion,
    season: Season,
) -> Result<f64> {
    find_periodic(
        |t| {
            let sun = ephemeris.observe_angle(t, observer, Body::Sun)?;
            Ok(sun.ecliptic_longitude_deg * DEG2RAD)
        },
        tt,
        motion,
        season.target(),
        TROPICAL_YEAR,
    )
}

/// Previous and next instance of every principal phase, sorted by instant
pub fn all_moon_phases<E: Ephemeris>(ephemeris: &E, observer: &Observer, tt: f64) -> Result<Vec<MotionEvent>> {
    let mut events = Vec::with_capacity(8);
    for motion in Motion::ALL {
        for phase in Phase::ALL {
            events.push(MotionEvent {
                instant: find_moon_phase(ephemeris, observer, tt, motion, phase)?,
                which: Occurrence::Phase(phase),
                motion,
            });
        }
    }
    events.sort_by(|a, b| a.instant.total_cmp(&b.instant));
    Ok(events)
}

/// Previous and next instance of every season, sorted by instant
pub fn all_seasons<E: Ephemeris>(ephemeris: &E, observer: &Observer, tt: f64) -> Result<Vec<MotionEvent>> {
    let mut events = Vec::with_capacity(8);
    for motion in Motion::ALL {
        for season in Season::ALL {
            events.push(MotionEvent {
                instant: find_season(ephemeris, observer, tt, motion, season)?,
                which: Occurrence::Season(season),
                motion,
            });
        }
    }
    events.sort_by(|a, b| a.instant.total_cmp(&b.instant));
    Ok(events)
}

/// Current elongation of the Moon from the Sun, degrees in `[0, 360)`
pub fn current_phase_angle<E: Ephemeris>(ephemeris: &E, observer: &Observer, tt: f64) -> Result<f64> {
    Ok(normalize_degrees(elongation(ephemeris, observer, tt)? / DEG2RAD))
}

/// Unicode moon glyph (🌑 .. 🌘) for an elongation in degrees
pub fn phase_glyph(elongation_deg: f64) -> char {
    let index = ((normalize_degrees(elongation_deg) + 22.5) / 45.0).floor() as u32 % 8;
    char::from_u32(0x1F311 + index).unwrap_or('?')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::AngularPosition;
    use crate::coordinates::HorizontalPosition;
    use crate::planetlib::AnalyticEphemeris;
    use crate::time::utc_to_tt;
    use crate::AlmanacError;
    use chrono::TimeZone;
    use rstest::rstest;

    /// Sun fixed at longitude 0, Moon advancing uniformly one turn per synodic month
    struct UniformMoon {
        new_moon: f64,
    }

    impl Ephemeris for UniformMoon {
        fn observe(&self, _tt: f64, _observer: &Observer, body: Body) -> Result<HorizontalPosition> {
            Err(AlmanacError::ObjectNotFound(body.to_string()))
        }

        fn observe_angle(&self, tt: f64, _observer: &Observer, body: Body) -> Result<AngularPosition> {
            let longitude = match body {
                Body::Sun => 0.0,
                _ => normalize_degrees(360.0 * (tt - self.new_moon) / SYNODIC_MONTH),
            };
            Ok(AngularPosition {
                right_ascension_deg: longitude,
                declination_deg: 0.0,
                ecliptic_longitude_deg: longitude,
            })
        }
    }

    fn observer() -> Observer {
        Observer::new(40.0, -83.0, 250.0, "UTC").unwrap()
    }

    #[rstest]
    #[case(Phase::FullMoon, Motion::Next, 2_460_015.0 + SYNODIC_MONTH / 2.0)]
    #[case(Phase::FirstQuarter, Motion::Next, 2_460_015.0 + SYNODIC_MONTH / 4.0)]
    #[case(Phase::NewMoon, Motion::Previous, 2_460_015.0)]
    #[case(Phase::LastQuarter, Motion::Previous, 2_460_015.0 - SYNODIC_MONTH / 4.0)]
    fn test_uniform_moon_phases(#[case] phase: Phase, #[case] motion: Motion, #[case] expected: f64) {
        let ephemeris = UniformMoon { new_moon: 2_460_015.0 };
        let start = 2_460_015.0 + 3.0;
        let found = find_moon_phase(&ephemeris, &observer(), start, motion, phase).unwrap();
        assert!(
            (found - expected).abs() <= DEFAULT_PRECISION,
            "{} {:?}: {} vs {}",
            phase,
            motion,
            found,
            expected
        );
    }

    #[test]
    fn test_analytic_full_moon() {
        // Full Moon of 2024-01-25 17:54 UTC
        let start = utc_to_tt(Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap());
        let expected = utc_to_tt(Utc.with_ymd_and_hms(2024, 1, 25, 17, 54, 0).unwrap());
        let found =
            find_moon_phase(&AnalyticEphemeris, &observer(), start, Motion::Next, Phase::FullMoon).unwrap();
        // The low-precision Moon is good to a few tens of minutes
        assert!((found - expected).abs() < 2.0 * HOUR, "off by {} days", found - expected);
    }

    #[test]
    fn test_analytic_june_solstice() {
        let start = utc_to_tt(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        let expected = utc_to_tt(Utc.with_ymd_and_hms(2024, 6, 20, 20, 51, 0).unwrap());
        let found = find_season(&AnalyticEphemeris, &observer(), start, Motion::Next, Season::Summer).unwrap();
        assert!((found - expected).abs() < 0.1, "off by {} days", found - expected);
    }

    #[test]
    fn test_all_moon_phases_sorted_around_start() {
        let ephemeris = UniformMoon { new_moon: 2_460_015.0 };
        let start = 2_460_015.0 + 3.0;
        let events = all_moon_phases(&ephemeris, &observer(), start).unwrap();
        assert_eq!(events.len(), 8);
        assert!(events.windows(2).all(|pair| pair[0].instant <= pair[1].instant));
        assert!(events
            .iter()
            .all(|e| (e.motion == Motion::Next) == (e.instant > start)));
    }

    #[test]
    fn test_all_seasons() {
        let start = utc_to_tt(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
        let events = all_seasons(&AnalyticEphemeris, &observer(), start).unwrap();
        assert_eq!(events.len(), 8);
        let next_fall = events
            .iter()
            .find(|e| e.which == Occurrence::Season(Season::Fall) && e.motion == Motion::Next)
            .unwrap();
        let utc = next_fall.utc().unwrap();
        assert_eq!(utc.format("%Y-%m-%d").to_string(), "2024-09-22");
    }

    #[rstest]
    #[case(10.0, Phase::FirstQuarter, Phase::NewMoon)]
    #[case(95.0, Phase::FullMoon, Phase::FirstQuarter)]
    #[case(200.0, Phase::LastQuarter, Phase::FullMoon)]
    #[case(359.0, Phase::NewMoon, Phase::LastQuarter)]
    fn test_following_and_preceding(#[case] angle: f64, #[case] next: Phase, #[case] previous: Phase) {
        assert_eq!(Phase::following(angle), next);
        assert_eq!(Phase::preceding(angle), previous);
    }

    #[test]
    fn test_phase_glyph() {
        assert_eq!(phase_glyph(0.0), '🌑');
        assert_eq!(phase_glyph(180.0), '🌕');
        assert_eq!(phase_glyph(350.0), '🌑');
    }

    #[test]
    fn test_current_phase_angle() {
        let ephemeris = UniformMoon { new_moon: 2_460_015.0 };
        let angle = current_phase_angle(&ephemeris, &observer(), 2_460_015.0 + SYNODIC_MONTH / 2.0).unwrap();
        assert!((angle - 180.0).abs() < 1e-6);
    }
}
