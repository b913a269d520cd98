//! Parallel construction of position tables
//!
//! A canonical year is split into one task per UTC calendar day. Each task
//! asks the ephemeris for the 1440 instants at the top of each minute and
//! keys the results by local civil time. Tasks share nothing; the merged
//! output is re-sorted globally, so neither the number of workers nor the
//! order in which days finish affects the resulting table.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::constants::MINUTES_PER_DAY;
use crate::planetlib::{Body, Ephemeris, Observer};
use crate::tables::{MinuteKey, PositionSample, PositionTable};
use crate::time::{days_of_year, to_civil, utc_midnight, utc_to_tt};
use crate::{AlmanacError, Result};

/// Progress of a running build, reported after each finished day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildProgress {
    pub completed: usize,
    pub total: usize,
}

type ProgressCallback = Box<dyn Fn(BuildProgress) + Send + Sync>;

/// Samples of one day, each paired with the UTC instant it was computed for
#[derive(Debug, Clone)]
struct DaySamples {
    samples: Vec<(DateTime<Utc>, PositionSample)>,
}

/// Builds [`PositionTable`]s by evaluating an ephemeris on a worker pool
pub struct BatchBuilder<E> {
    ephemeris: E,
    workers: usize,
    max_retries: u32,
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<ProgressCallback>,
}

/// Round to one decimal place, the precision tables are stored with
fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl<E: Ephemeris + Sync> BatchBuilder<E> {
    /// Create a builder using one worker per available CPU
    pub fn new(ephemeris: E) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            ephemeris,
            workers,
            max_retries: 0,
            cancel: None,
            progress: None,
        }
    }

    /// Set the size of the worker pool (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Re-run a failed day up to `max_retries` times before giving up
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Abort the build with `Cancelled` once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Call `callback` each time a day finishes
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(BuildProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn ephemeris(&self) -> &E {
        &self.ephemeris
    }

    /// Build the table of `body` for every day of `canonical_year`
    pub fn build(&self, observer: &Observer, body: Body, canonical_year: i32) -> Result<PositionTable> {
        let days = days_of_year(canonical_year)?;
        self.build_days(observer, body, canonical_year, &days)
    }

    /// Build a table covering `days` consecutive UTC days starting at `first`
    pub fn build_span(
        &self,
        observer: &Observer,
        body: Body,
        first: NaiveDate,
        days: usize,
    ) -> Result<PositionTable> {
        let dates: Vec<NaiveDate> = first.iter_days().take(days).collect();
        self.build_days(observer, body, first.year(), &dates)
    }

    fn build_days(
        &self,
        observer: &Observer,
        body: Body,
        canonical_year: i32,
        days: &[NaiveDate],
    ) -> Result<PositionTable> {
        let tz = observer.tz()?;
        let start = Instant::now();
        info!(
            "Building {} table for {} over {} days with {} workers",
            body,
            observer,
            days.len(),
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| AlmanacError::BuildFailure {
                date: days.first().copied().unwrap_or_default(),
                reason: format!("Failed to start worker pool: {}", e),
            })?;

        let completed = AtomicUsize::new(0);
        let total = days.len();
        let results = pool.install(|| {
            days.par_iter()
                .map(|&date| {
                    let day = self.compute_day_with_retries(observer, body, date, tz)?;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!("Finished {} ({}/{})", date, done, total);
                    if let Some(progress) = &self.progress {
                        progress(BuildProgress {
                            completed: done,
                            total,
                        });
                    }
                    Ok(day)
                })
                .collect::<Result<Vec<DaySamples>>>()
        })?;

        let samples = merge(results);
        info!(
            "Built {} table: {} samples in {:.2?}",
            body,
            samples.len(),
            start.elapsed()
        );
        PositionTable::new(body, observer.clone(), canonical_year, samples)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn compute_day_with_retries(
        &self,
        observer: &Observer,
        body: Body,
        date: NaiveDate,
        tz: Tz,
    ) -> Result<DaySamples> {
        let mut attempt = 0;
        loop {
            if self.is_cancelled() {
                return Err(AlmanacError::Cancelled);
            }
            match self.compute_day(observer, body, date, tz) {
                Ok(day) => return Ok(day),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!("Day {} failed ({}), retry {}/{}", date, e, attempt, self.max_retries);
                }
                Err(e) => {
                    return Err(AlmanacError::BuildFailure {
                        date,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    fn compute_day(&self, observer: &Observer, body: Body, date: NaiveDate, tz: Tz) -> Result<DaySamples> {
        let midnight = utc_midnight(date);
        let instants: Vec<DateTime<Utc>> = (0..MINUTES_PER_DAY)
            .map(|minute| midnight + Duration::minutes(minute as i64))
            .collect();
        let tts: Vec<f64> = instants.iter().map(|&instant| utc_to_tt(instant)).collect();

        let positions = self.ephemeris.observe_many(&tts, observer, body)?;
        if positions.len() != instants.len() {
            return Err(AlmanacError::DataError(format!(
                "Ephemeris returned {} positions for {} instants",
                positions.len(),
                instants.len()
            )));
        }

        let samples = instants
            .into_iter()
            .zip(positions)
            .map(|(instant, position)| {
                let key = MinuteKey::from_civil(&to_civil(instant, tz));
                let sample = PositionSample::new(
                    key,
                    round_tenth(position.altitude_deg),
                    round_tenth(position.azimuth_deg) % 360.0,
                );
                (instant, sample)
            })
            .collect();
        Ok(DaySamples { samples })
    }
}

/// Merge per-day results into one key-ordered sequence
///
/// Repeated civil keys (the hour replayed at a DST fall-back) keep the
/// sample with the earliest UTC instant.
fn merge(days: Vec<DaySamples>) -> Vec<PositionSample> {
    let mut timed: Vec<(DateTime<Utc>, PositionSample)> =
        days.into_iter().flat_map(|day| day.samples).collect();
    timed.sort_by_key(|(instant, sample)| (sample.key(), *instant));

    let before = timed.len();
    timed.dedup_by_key(|(_, sample)| sample.key());
    if timed.len() < before {
        warn!(
            "Dropped {} samples with repeated civil keys",
            before - timed.len()
        );
    }
    timed.into_iter().map(|(_, sample)| sample).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::{AngularPosition, HorizontalPosition};
    use crate::planetlib::AnalyticEphemeris;
    use crate::time::tt_to_utc;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use std::sync::Mutex;

    /// Altitude and azimuth sweep once per day with the fractional TT day
    struct Sweep;

    impl Ephemeris for Sweep {
        fn observe(&self, tt: f64, _observer: &Observer, _body: Body) -> Result<HorizontalPosition> {
            let fraction = tt.rem_euclid(1.0);
            Ok(HorizontalPosition::new(
                (fraction * std::f64::consts::TAU).sin() * 60.0,
                fraction * 360.0,
            ))
        }

        fn observe_angle(&self, _tt: f64, _observer: &Observer, body: Body) -> Result<AngularPosition> {
            Err(AlmanacError::ObjectNotFound(body.to_string()))
        }
    }

    /// Fails on one date, `failures` times before succeeding
    struct Flaky {
        bad_day: NaiveDate,
        failures: usize,
        calls: AtomicUsize,
    }

    impl Ephemeris for Flaky {
        fn observe(&self, tt: f64, observer: &Observer, body: Body) -> Result<HorizontalPosition> {
            Sweep.observe(tt, observer, body)
        }

        fn observe_angle(&self, tt: f64, observer: &Observer, body: Body) -> Result<AngularPosition> {
            Sweep.observe_angle(tt, observer, body)
        }

        fn observe_many(&self, tts: &[f64], observer: &Observer, body: Body) -> Result<Vec<HorizontalPosition>> {
            let day = match tts.first() {
                Some(&first) => tt_to_utc(first)?.date_naive(),
                None => return Ok(Vec::new()),
            };
            if day == self.bad_day && self.calls.fetch_add(1, Ordering::SeqCst) < self.failures
            {
                return Err(AlmanacError::DataError("ephemeris unavailable".to_string()));
            }
            tts.iter().map(|&tt| Sweep.observe(tt, observer, body)).collect()
        }
    }

    fn utc_observer() -> Observer {
        Observer::new(40.0, -83.0, 250.0, "UTC").unwrap()
    }

    fn june_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_each_utc_day_has_1440_samples() {
        let table = BatchBuilder::new(Sweep)
            .with_workers(2)
            .build_span(&utc_observer(), Body::Sun, june_first(), 3)
            .unwrap();
        assert_eq!(table.len(), 3 * 1440);
        for day in 1..=3 {
            assert_eq!(table.on_date(6, day).unwrap().len(), 1440);
        }
        assert!(table
            .samples()
            .iter()
            .all(|s| (s.altitude_deg * 10.0 - (s.altitude_deg * 10.0).round()).abs() < 1e-9));
    }

    #[test]
    fn test_full_leap_year() {
        let table = BatchBuilder::new(Sweep)
            .build(&utc_observer(), Body::Sun, 2024)
            .unwrap();
        assert_eq!(table.len(), 366 * 1440);
        assert_eq!(table.canonical_year(), 2024);
    }

    #[test]
    fn test_output_invariant_under_worker_count() {
        let observer = Observer::new(40.0, -83.0, 250.0, "America/New_York").unwrap();
        let serial = BatchBuilder::new(AnalyticEphemeris)
            .with_workers(1)
            .build_span(&observer, Body::Moon, june_first(), 4)
            .unwrap();
        let parallel = BatchBuilder::new(AnalyticEphemeris)
            .with_workers(4)
            .build_span(&observer, Body::Moon, june_first(), 4)
            .unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_merge_ignores_completion_order() {
        let builder = BatchBuilder::new(Sweep);
        let tz = chrono_tz::America::New_York;
        let days: Vec<DaySamples> = june_first()
            .iter_days()
            .take(5)
            .map(|date| builder.compute_day(&utc_observer(), Body::Sun, date, tz).unwrap())
            .collect();
        let in_order = merge(days.clone());

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let mut shuffled = days.clone();
            shuffled.shuffle(&mut rng);
            assert_eq!(merge(shuffled), in_order);
        }
        assert!(in_order.windows(2).all(|pair| pair[0].key() < pair[1].key()));
    }

    #[test]
    fn test_dst_fall_back_keeps_earliest_instant() {
        // 2024-11-03: 01:00-01:59 EDT and EST both map to civil 01:xx
        let builder = BatchBuilder::new(Sweep);
        let observer = Observer::new(40.0, -83.0, 250.0, "America/New_York").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap();
        let tz = observer.tz().unwrap();
        let day = builder.compute_day(&observer, Body::Sun, date, tz).unwrap();
        let first_one_am = day
            .samples
            .iter()
            .find(|(_, s)| s.key() == MinuteKey::new(11, 3, 1, 30))
            .map(|(instant, s)| (*instant, *s))
            .unwrap();

        let merged = merge(vec![day]);
        let kept = merged
            .iter()
            .find(|s| s.key() == MinuteKey::new(11, 3, 1, 30))
            .unwrap();
        assert_eq!(*kept, first_one_am.1);
        assert_eq!(first_one_am.0.to_rfc3339(), "2024-11-03T05:30:00+00:00");
        assert_eq!(merged.len(), 1440 - 60);
    }

    #[test]
    fn test_failed_day_aborts_build() {
        let bad_day = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let flaky = Flaky {
            bad_day,
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let result = BatchBuilder::new(flaky)
            .with_workers(2)
            .build_span(&utc_observer(), Body::Sun, june_first(), 3);
        match result {
            Err(AlmanacError::BuildFailure { date, reason }) => {
                assert_eq!(date, bad_day);
                assert!(reason.contains("ephemeris unavailable"));
            }
            other => panic!("Expected BuildFailure, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_retry_recovers_failed_day() {
        let flaky = Flaky {
            bad_day: june_first(),
            failures: 1,
            calls: AtomicUsize::new(0),
        };
        let builder = BatchBuilder::new(flaky).with_max_retries(2);
        let table = builder
            .build_span(&utc_observer(), Body::Sun, june_first(), 2)
            .unwrap();
        assert_eq!(table.len(), 2 * 1440);
        // One failed attempt plus the successful retry
        assert_eq!(builder.ephemeris().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failures_beyond_retry_budget_abort_build() {
        let flaky = Flaky {
            bad_day: june_first(),
            failures: 3,
            calls: AtomicUsize::new(0),
        };
        let builder = BatchBuilder::new(flaky).with_max_retries(2);
        let result = builder.build_span(&utc_observer(), Body::Sun, june_first(), 2);
        assert!(matches!(
            result,
            Err(AlmanacError::BuildFailure { date, .. }) if date == june_first()
        ));
        assert_eq!(builder.ephemeris().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancel_flag() {
        let flag = Arc::new(AtomicBool::new(true));
        let result = BatchBuilder::new(Sweep)
            .with_cancel_flag(flag)
            .build_span(&utc_observer(), Body::Sun, june_first(), 2);
        assert!(matches!(result, Err(AlmanacError::Cancelled)));
    }

    #[test]
    fn test_progress_reaches_total() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        BatchBuilder::new(Sweep)
            .with_workers(3)
            .with_progress(move |progress| sink.lock().unwrap().push(progress))
            .build_span(&utc_observer(), Body::Sun, june_first(), 6)
            .unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_by_key(|p| p.completed);
        assert_eq!(seen.len(), 6);
        assert_eq!(seen.last(), Some(&BuildProgress { completed: 6, total: 6 }));
    }
}
