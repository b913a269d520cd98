//! Precision refinement of event times
//!
//! The minute tables are rounded to 0.1° and are far too coarse to time an
//! event to the second. Everything here goes back to the [`Ephemeris`]
//! on every evaluation instead:
//!
//! - [`phases`]: lunar phases and seasons via a seeded secant iteration
//! - [`crossings`]: altitude and azimuth crossings via hourly bracketing
//!   and Brent's method
//! - [`solvers`]: the root finders themselves
//!
//! [`Ephemeris`]: crate::planetlib::Ephemeris

pub mod crossings;
pub mod phases;
pub mod solvers;

pub use crossings::{find_crossings, refine_threshold_events, Crossing, CrossingTarget, RefinedEvent};
pub use phases::{
    all_moon_phases, all_seasons, current_phase_angle, find_moon_phase, find_season, phase_glyph,
    Motion, MotionEvent, Occurrence, Phase, Season,
};
pub use solvers::{brent, find_sign_changes, secant, Bracket};
