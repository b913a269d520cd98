//! Precise threshold crossings straight from the ephemeris
//!
//! The target function is sampled once per hour; each sign change between
//! consecutive samples is assumed to hold exactly one crossing and is
//! refined with Brent's method. The position at the refined instant comes
//! back from the objective itself.

use crate::constants::{DEFAULT_PRECISION, HOUR};
use crate::coordinates::{wrap_degrees, HorizontalPosition};
use crate::horizon::Threshold;
use crate::planetlib::{Body, Ephemeris, Observer};
use crate::tables::EventKind;
use crate::{AlmanacError, Result};

use super::solvers::{brent, find_sign_changes, Bracket};

/// What a crossing search looks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrossingTarget {
    /// Altitude in degrees
    Altitude(f64),
    /// Azimuth in degrees
    Azimuth(f64),
}

impl CrossingTarget {
    fn residual(&self, position: &HorizontalPosition) -> f64 {
        match *self {
            CrossingTarget::Altitude(degrees) => position.altitude_deg - degrees,
            CrossingTarget::Azimuth(degrees) => wrap_degrees(position.azimuth_deg - degrees),
        }
    }

    /// Whether a bracket is a real crossing rather than the ±180° seam of a
    /// wrapped azimuth residual
    fn is_crossing(&self, bracket: &Bracket) -> bool {
        match self {
            CrossingTarget::Altitude(_) => true,
            CrossingTarget::Azimuth(_) => (bracket.f_end - bracket.f_start).abs() < 180.0,
        }
    }
}

/// One refined crossing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// TT Julian date
    pub instant: f64,
    /// Residual went from negative to non-negative
    pub rising: bool,
    /// Position of the body at `instant`
    pub position: HorizontalPosition,
}

/// A refined horizon or twilight event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinedEvent {
    /// TT Julian date
    pub instant: f64,
    pub kind: EventKind,
    pub azimuth_deg: f64,
}

/// Every crossing of `target` by `body` in `days` days from `start`
///
/// Fails with `EventNotFound` when nothing crosses in the span.
pub fn find_crossings<E: Ephemeris>(
    ephemeris: &E,
    observer: &Observer,
    body: Body,
    start: f64,
    days: f64,
    target: CrossingTarget,
) -> Result<Vec<Crossing>> {
    let objective = |tt: f64| -> Result<(f64, HorizontalPosition)> {
        let position = ephemeris.observe(tt, observer, body)?;
        Ok((target.residual(&position), position))
    };

    let brackets = find_sign_changes(|tt| Ok(objective(tt)?.0), start, start + days, HOUR)?;
    let crossings = brackets
        .iter()
        .filter(|bracket| target.is_crossing(bracket))
        .map(|bracket| {
            let (instant, position) = brent(&objective, bracket.start, bracket.end, DEFAULT_PRECISION)?;
            Ok(Crossing {
                instant,
                rising: bracket.is_rising(),
                position,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if crossings.is_empty() {
        return Err(AlmanacError::EventNotFound(format!(
            "{} never crosses {:?} in {} days from {}",
            body, target, days, start
        )));
    }
    Ok(crossings)
}

/// Precise events for each altitude threshold, sorted by instant
///
/// A threshold that is never crossed contributes nothing; the call fails
/// with `EventNotFound` only if no threshold is crossed at all.
pub fn refine_threshold_events<E: Ephemeris>(
    ephemeris: &E,
    observer: &Observer,
    body: Body,
    start: f64,
    days: f64,
    thresholds: &[Threshold],
) -> Result<Vec<RefinedEvent>> {
    let mut events = Vec::new();
    for threshold in thresholds {
        let target = CrossingTarget::Altitude(threshold.degrees);
        let crossings = match find_crossings(ephemeris, observer, body, start, days, target) {
            Ok(crossings) => crossings,
            Err(AlmanacError::EventNotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        events.extend(crossings.into_iter().map(|crossing| RefinedEvent {
            instant: crossing.instant,
            kind: if crossing.rising {
                threshold.rising
            } else {
                threshold.falling
            },
            azimuth_deg: crossing.position.azimuth_deg,
        }));
    }

    if events.is_empty() {
        return Err(AlmanacError::EventNotFound(format!(
            "{} crosses none of {} thresholds in {} days",
            body,
            thresholds.len(),
            days
        )));
    }
    events.sort_by(|a, b| a.instant.total_cmp(&b.instant));
    Ok(events)
}
