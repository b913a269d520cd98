//! Time module for almanac calculations
//!
//! Instants handed to an [`Ephemeris`](crate::planetlib::Ephemeris) are
//! Terrestrial Time Julian dates. Tables, on the other hand, are keyed by
//! local civil time. This module bridges the two: UTC ↔ TT conversion via a
//! leap second table, a ΔT approximation for UT1, and the calendar helpers
//! used to enumerate the days of a canonical year.

use crate::constants::{DAY_S, TT_MINUS_TAI_S, UNIX_EPOCH_JD};
use crate::{AlmanacError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Leap second table: (UTC Julian date the offset takes effect, TAI - UTC seconds)
const LEAP_SECONDS: [(f64, f64); 28] = [
    (2441317.5, 10.0), // 1972-01-01
    (2441499.5, 11.0), // 1972-07-01
    (2441683.5, 12.0), // 1973-01-01
    (2442048.5, 13.0), // 1974-01-01
    (2442413.5, 14.0), // 1975-01-01
    (2442778.5, 15.0), // 1976-01-01
    (2443144.5, 16.0), // 1977-01-01
    (2443509.5, 17.0), // 1978-01-01
    (2443874.5, 18.0), // 1979-01-01
    (2444239.5, 19.0), // 1980-01-01
    (2444786.5, 20.0), // 1981-07-01
    (2445151.5, 21.0), // 1982-07-01
    (2445516.5, 22.0), // 1983-07-01
    (2446247.5, 23.0), // 1985-07-01
    (2447161.5, 24.0), // 1988-01-01
    (2447892.5, 25.0), // 1990-01-01
    (2448257.5, 26.0), // 1991-01-01
    (2448804.5, 27.0), // 1992-07-01
    (2449169.5, 28.0), // 1993-07-01
    (2449534.5, 29.0), // 1994-07-01
    (2450083.5, 30.0), // 1996-01-01
    (2450630.5, 31.0), // 1997-07-01
    (2451179.5, 32.0), // 1999-01-01
    (2453736.5, 33.0), // 2006-01-01
    (2454832.5, 34.0), // 2009-01-01
    (2456109.5, 35.0), // 2012-07-01
    (2457204.5, 36.0), // 2015-07-01
    (2457754.5, 37.0), // 2017-01-01
];

/// TAI - UTC in seconds at a UTC Julian date
pub fn leap_seconds(jd_utc: f64) -> f64 {
    // Index of the first entry that takes effect after jd_utc
    let index = LEAP_SECONDS.partition_point(|&(start, _)| start <= jd_utc);
    if index == 0 {
        // Before 1972 there is no integral offset; treat as the first one
        LEAP_SECONDS[0].1
    } else {
        LEAP_SECONDS[index - 1].1
    }
}

/// Julian date (UTC) of a UTC datetime
pub fn utc_julian_date(dt: DateTime<Utc>) -> f64 {
    let seconds = dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1_000_000_000.0;
    UNIX_EPOCH_JD + seconds / DAY_S
}

/// Convert a UTC datetime to a Terrestrial Time Julian date
pub fn utc_to_tt(dt: DateTime<Utc>) -> f64 {
    let jd_utc = utc_julian_date(dt);
    jd_utc + (leap_seconds(jd_utc) + TT_MINUS_TAI_S) / DAY_S
}

/// Convert a Terrestrial Time Julian date back to a UTC datetime
///
/// An `f64` Julian date carries tens of microseconds of noise for modern
/// dates, so the result is rounded to whole milliseconds. Instants on a
/// minute boundary come back on that boundary.
pub fn tt_to_utc(tt: f64) -> Result<DateTime<Utc>> {
    // The leap offset is looked up with an approximate UTC value; a second
    // pass settles instants that land right after a leap second boundary.
    let mut jd_utc = tt - (leap_seconds(tt) + TT_MINUS_TAI_S) / DAY_S;
    jd_utc = tt - (leap_seconds(jd_utc) + TT_MINUS_TAI_S) / DAY_S;

    let millis = ((jd_utc - UNIX_EPOCH_JD) * DAY_S * 1_000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return Err(AlmanacError::TimeError(format!("TT {} is outside the datetime range", tt)));
    }

    DateTime::<Utc>::from_timestamp_millis(millis as i64)
        .ok_or_else(|| AlmanacError::TimeError(format!("TT {} is outside the datetime range", tt)))
}

/// Convert a Terrestrial Time Julian date to UT1
pub fn tt_to_ut1(tt: f64) -> f64 {
    tt - delta_t(tt) / DAY_S
}

/// Approximate ΔT (TT - UT1) in seconds for a TT Julian date
///
/// Polynomial fits from Espenak & Meeus, restricted to the span an almanac
/// table is plausibly built for.
pub fn delta_t(tt: f64) -> f64 {
    let year = (tt - 1_721_045.0) / 365.25;

    if year < 1900.0 {
        // Long-term parabola
        let u = (year - 1820.0) / 100.0;
        -20.0 + 32.0 * u * u
    } else if year < 1920.0 {
        let t = year - 1900.0;
        -2.79 + 1.494119 * t - 0.0598939 * t * t + 0.0061966 * t.powi(3) - 0.000197 * t.powi(4)
    } else if year < 1941.0 {
        let t = year - 1920.0;
        21.20 + 0.84493 * t - 0.076100 * t * t + 0.0020936 * t.powi(3)
    } else if year < 1961.0 {
        let t = year - 1950.0;
        29.07 + 0.407 * t - t * t / 233.0 + t.powi(3) / 2547.0
    } else if year < 1986.0 {
        let t = year - 1975.0;
        45.45 + 1.067 * t - t * t / 260.0 - t.powi(3) / 718.0
    } else if year < 2005.0 {
        let t = year - 2000.0;
        63.86 + 0.3345 * t - 0.060374 * t * t
            + 0.0017275 * t.powi(3)
            + 0.000651814 * t.powi(4)
            + 0.00002373599 * t.powi(5)
    } else if year < 2050.0 {
        let t = year - 2000.0;
        62.92 + 0.32217 * t + 0.005589 * t * t
    } else if year < 2150.0 {
        let u = (year - 1820.0) / 100.0;
        -20.0 + 32.0 * u * u - 0.5628 * (2150.0 - year)
    } else {
        let u = (year - 1820.0) / 100.0;
        -20.0 + 32.0 * u * u
    }
}

/// Whether `year` is a Gregorian leap year
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Every calendar day of `year`, in order (365 or 366 entries)
pub fn days_of_year(year: i32) -> Result<Vec<NaiveDate>> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| AlmanacError::TimeError(format!("Year {} is not representable", year)))?;
    let count = if is_leap_year(year) { 366 } else { 365 };
    Ok(first.iter_days().take(count).collect())
}

/// Local civil time of a UTC instant in `tz`
pub fn to_civil(dt: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    dt.with_timezone(&tz).naive_local()
}

/// Midnight UTC at the start of `date`
pub fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}
