//! Root finders used to refine event times
//!
//! Both work on a real function of TT Julian date. The secant iteration
//! needs no bracket but must be seeded close to the root; Brent's method
//! needs a sign change and always stays inside it.

use log::debug;

use crate::constants::{BRENT_MAX_ITERATIONS, SECANT_MAX_ITERATIONS};
use crate::{AlmanacError, Result};

/// Secant iteration from the two seeds `x0` and `x1`
///
/// Stops when the step falls below `precision`, when `f(x1)` is exactly
/// zero, or when the last two evaluations are equal. The last case is a
/// flat region, not a failure: the current abscissa is returned.
pub fn secant<F>(mut f: F, x0: f64, x1: f64, precision: f64) -> Result<f64>
where
    F: FnMut(f64) -> Result<f64>,
{
    let (mut x0, mut x1) = (x0, x1);
    let mut f0 = f(x0)?;
    let mut f1 = f(x1)?;

    for _ in 0..SECANT_MAX_ITERATIONS {
        if f1 == 0.0 || (x1 - x0).abs() <= precision {
            return Ok(x1);
        }
        if f1 == f0 {
            debug!("Secant iteration stalled at {} (f = {})", x1, f1);
            return Ok(x1);
        }
        let next = x1 + (x1 - x0) / (f0 / f1 - 1.0);
        if !next.is_finite() {
            break;
        }
        x0 = x1;
        f0 = f1;
        x1 = next;
        f1 = f(x1)?;
    }

    if f1 == 0.0 || (x1 - x0).abs() <= precision {
        return Ok(x1);
    }
    Err(AlmanacError::DidNotConverge {
        iterations: SECANT_MAX_ITERATIONS,
    })
}

/// An interval whose endpoints have opposite signs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub start: f64,
    pub end: f64,
    pub f_start: f64,
    pub f_end: f64,
}

impl Bracket {
    /// Whether the function goes from negative to non-negative
    pub fn is_rising(&self) -> bool {
        self.f_start < 0.0
    }
}

/// Sample `f` every `step` from `start` to `end` and return the brackets
/// between consecutive samples of opposite sign
///
/// Zero counts as positive, so a sample landing exactly on a root opens a
/// bracket ending on it rather than producing two.
pub fn find_sign_changes<F>(mut f: F, start: f64, end: f64, step: f64) -> Result<Vec<Bracket>>
where
    F: FnMut(f64) -> Result<f64>,
{
    if !(step > 0.0) || end < start {
        return Err(AlmanacError::DataError(format!(
            "Invalid sampling span {}..{} with step {}",
            start, end, step
        )));
    }
    // A partial last step still samples `end`; the slack keeps float noise
    // in a whole number of steps from adding a sliver step.
    let count = ((end - start) / step - 1e-9).ceil().max(0.0) as usize;

    let mut brackets = Vec::new();
    let mut previous = (start, f(start)?);
    for i in 1..=count {
        let t = if i == count { end } else { start + i as f64 * step };
        let value = f(t)?;
        if (previous.1 >= 0.0) != (value >= 0.0) {
            brackets.push(Bracket {
                start: previous.0,
                end: t,
                f_start: previous.1,
                f_end: value,
            });
        }
        previous = (t, value);
    }
    Ok(brackets)
}

/// Brent's method on `[a, b]`
///
/// The objective returns the residual together with an auxiliary value
/// computed at the same point; the auxiliary of the returned root is handed
/// back with it. Fails with `EventNotFound` when `f(a)` and `f(b)` have the
/// same sign.
pub fn brent<A, F>(mut f: F, a: f64, b: f64, tolerance: f64) -> Result<(f64, A)>
where
    A: Clone,
    F: FnMut(f64) -> Result<(f64, A)>,
{
    let (mut a, mut b) = (a, b);
    let (mut fa, mut aux_a) = f(a)?;
    let (mut fb, mut aux_b) = f(b)?;

    if fa == 0.0 {
        return Ok((a, aux_a));
    }
    if fb == 0.0 {
        return Ok((b, aux_b));
    }
    if (fa > 0.0) == (fb > 0.0) {
        return Err(AlmanacError::EventNotFound(format!(
            "No sign change between {} and {}",
            a, b
        )));
    }

    let (mut c, mut fc, mut aux_c) = (b, fb, aux_b.clone());
    let (mut d, mut e) = (b - a, b - a);

    for _ in 0..BRENT_MAX_ITERATIONS {
        if (fb > 0.0) == (fc > 0.0) {
            c = a;
            fc = fa;
            aux_c = aux_a.clone();
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
            aux_a = aux_b;
            aux_b = aux_c;
            aux_c = aux_a.clone();
        }

        let tol = 2.0 * f64::EPSILON * b.abs() + 0.5 * tolerance;
        let midpoint = 0.5 * (c - b);
        if midpoint.abs() <= tol || fb == 0.0 {
            return Ok((b, aux_b));
        }

        if e.abs() >= tol && fa.abs() > fb.abs() {
            // Inverse quadratic interpolation, or secant when only two points are distinct
            let s = fb / fa;
            let (mut p, mut q) = if a == c {
                (2.0 * midpoint * s, 1.0 - s)
            } else {
                let q = fa / fc;
                let r = fb / fc;
                (
                    s * (2.0 * midpoint * q * (q - r) - (b - a) * (r - 1.0)),
                    (q - 1.0) * (r - 1.0) * (s - 1.0),
                )
            };
            if p > 0.0 {
                q = -q;
            }
            p = p.abs();
            let min1 = 3.0 * midpoint * q - (tol * q).abs();
            let min2 = (e * q).abs();
            if 2.0 * p < min1.min(min2) {
                e = d;
                d = p / q;
            } else {
                d = midpoint;
                e = d;
            }
        } else {
            d = midpoint;
            e = d;
        }

        a = b;
        fa = fb;
        aux_a = aux_b.clone();
        b += if d.abs() > tol { d } else { tol.copysign(midpoint) };
        (fb, aux_b) = f(b)?;
    }

    Err(AlmanacError::DidNotConverge {
        iterations: BRENT_MAX_ITERATIONS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_PRECISION, HOUR};
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::f64::consts::PI;

    #[rstest]
    #[case(3.0, 3.1, PI)]
    #[case(6.0, 6.1, 2.0 * PI)]
    #[case(0.3, 0.2, 0.0)]
    fn test_secant_finds_sine_roots(#[case] x0: f64, #[case] x1: f64, #[case] root: f64) {
        let found = secant(|t| Ok(t.sin()), x0, x1, 1e-10).unwrap();
        assert_relative_eq!(found, root, epsilon = 1e-9);
    }

    #[test]
    fn test_secant_within_default_precision() {
        // A slow periodic function in days, like a phase angle
        let period = 29.53;
        let root = 10.0 + period / 2.0;
        let f = |t: f64| Ok((2.0 * PI * (t - 10.0) / period).sin());
        let found = secant(f, root - 0.4, root - 0.4 + HOUR, DEFAULT_PRECISION).unwrap();
        assert!((found - root).abs() <= DEFAULT_PRECISION);
    }

    #[test]
    fn test_secant_stall_is_converged() {
        let found = secant(|_| Ok(1.0), 0.0, 1.0, 1e-9).unwrap();
        assert_eq!(found, 1.0);
    }

    #[test]
    fn test_secant_reports_divergence() {
        // No real root: iterations wander without converging
        let result = secant(|t| Ok(t * t + 1.0), 0.5, 0.6, 1e-12);
        assert!(matches!(result, Err(AlmanacError::DidNotConverge { .. })));
    }

    #[test]
    fn test_sign_changes_of_sine() {
        let brackets = find_sign_changes(|t| Ok(t.sin()), 0.5, 10.0, 0.25).unwrap();
        assert_eq!(brackets.len(), 3);
        assert!(brackets[0].start < PI && PI < brackets[0].end);
        assert!(!brackets[0].is_rising());
        assert!(brackets[1].is_rising());
    }

    #[test]
    fn test_sign_change_in_known_hour() {
        // Single crossing at 14:20 on day 0
        let root = 14.0 * HOUR + 20.0 / 1440.0;
        let f = |t: f64| Ok(t - root);
        let brackets = find_sign_changes(f, 0.0, 1.0, HOUR).unwrap();
        assert_eq!(brackets.len(), 1);
        let bracket = brackets[0];
        assert_relative_eq!(bracket.start, 14.0 * HOUR, epsilon = 1e-12);

        let (found, residual) = brent(|t| Ok((t - root, t - root)), bracket.start, bracket.end, DEFAULT_PRECISION).unwrap();
        assert!(bracket.start <= found && found <= bracket.end);
        assert!(residual.abs() <= DEFAULT_PRECISION);
    }

    #[test]
    fn test_brent_returns_auxiliary_at_root() {
        let (root, aux) = brent(|t: f64| Ok((t.cos(), t * 2.0)), 1.0, 2.0, 1e-12).unwrap();
        assert_relative_eq!(root, PI / 2.0, epsilon = 1e-10);
        assert_relative_eq!(aux, PI, epsilon = 1e-9);
    }

    #[test]
    fn test_brent_without_sign_change() {
        let result = brent(|t: f64| Ok((t * t + 1.0, ())), -1.0, 1.0, 1e-9);
        assert!(matches!(result, Err(AlmanacError::EventNotFound(_))));
    }

    #[rstest]
    #[case(1.4 * HOUR, 1.2 * HOUR)]
    #[case(0.4 * HOUR, 0.2 * HOUR)]
    #[case(2.5 * HOUR, 2.4 * HOUR)]
    fn test_partial_last_step_reaches_end(#[case] span: f64, #[case] root: f64) {
        let brackets = find_sign_changes(|t| Ok(t - root), 0.0, span, HOUR).unwrap();
        assert_eq!(brackets.len(), 1);
        assert!(brackets[0].start < root && root <= brackets[0].end);
        assert_eq!(brackets[0].end, span);
    }

    #[test]
    fn test_samples_stay_inside_span() {
        let mut last = 0.0;
        find_sign_changes(
            |t| {
                last = t;
                Ok(1.0)
            },
            0.0,
            3.5 * HOUR,
            HOUR,
        )
        .unwrap();
        assert_eq!(last, 3.5 * HOUR);
    }

    #[test]
    fn test_no_sign_change_gives_empty() {
        let brackets = find_sign_changes(|t| Ok(t + 5.0), 0.0, 1.0, HOUR).unwrap();
        assert!(brackets.is_empty());
    }
}
