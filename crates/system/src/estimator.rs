//! Rolling CPU-utilization estimator.
//!
//! Each call to [`CpuLoadEstimator::sample`] pulls one fresh sample and
//! computes the load since a retained anchor. Two anchors are kept: the
//! `interim` sample (the previous good reading) and the `oldest` one. When
//! the interval to `interim` is too short or its deltas are garbage (clock
//! or counter rollover), the estimator retries against `oldest` before
//! giving up, so callers never have to manage history themselves.

use crate::source::SampleSource;
use mx_core::{CpuLoad, Sample, MINIMUM_INTERVAL_NS};
use tracing::{debug, warn};

/// Three-slot CPU load estimator over an injected [`SampleSource`].
///
/// Not internally synchronized; wrap it in a lock or give each consumer its
/// own instance.
#[derive(Debug)]
pub struct CpuLoadEstimator<S> {
    source:           S,
    minimum_interval: i64,
    oldest:           Option<Sample>,
    interim:          Option<Sample>,
    latest:           Option<Sample>,
}

impl<S: SampleSource> CpuLoadEstimator<S> {
    pub fn new(source: S) -> Self {
        Self::with_minimum_interval(source, MINIMUM_INTERVAL_NS)
    }

    /// Use a custom minimum interval, in the source's timestamp units.
    pub fn with_minimum_interval(source: S, minimum_interval: i64) -> Self {
        Self {
            source,
            minimum_interval,
            oldest: None,
            interim: None,
            latest: None,
        }
    }

    /// Take a fresh sample and return the CPU load since a retained anchor.
    pub fn sample(&mut self) -> CpuLoad {
        let latest = match self.source.current_sample() {
            Ok(s) => s,
            Err(e) => {
                warn!("CPU sample source failed: {e}");
                return CpuLoad::InternalError;
            }
        };
        if !latest.is_ok() {
            return CpuLoad::Unavailable(latest.status);
        }
        self.latest = Some(latest);

        let (Some(oldest), Some(interim)) = (self.oldest, self.interim) else {
            self.oldest = Some(latest);
            self.interim = Some(latest);
            return CpuLoad::NotYetAvailable;
        };

        match self.measure(&interim, &latest) {
            Interval::Usable(load) => {
                self.oldest = Some(interim);
                self.interim = Some(latest);
                return CpuLoad::Load(load);
            }
            Interval::Invalid => {
                debug!(?interim, ?latest, "discarding interim CPU sample");
                self.interim = Some(latest);
            }
            Interval::TooShort => {}
        }

        match self.measure(&oldest, &latest) {
            Interval::Usable(load) => return CpuLoad::Load(load),
            Interval::Invalid => {
                debug!(?oldest, ?latest, "discarding oldest CPU sample");
                self.oldest = Some(latest);
            }
            Interval::TooShort => {}
        }

        CpuLoad::NotYetAvailable
    }

    /// Classify the interval from `anchor` to `latest`. A clock that went
    /// backwards or a span that overflows `i64` makes the pair invalid
    /// rather than merely short.
    fn measure(&self, anchor: &Sample, latest: &Sample) -> Interval {
        let Some(delta_t) = latest.timestamp.checked_sub(anchor.timestamp) else {
            return Interval::Invalid;
        };
        if delta_t < 0 {
            return Interval::Invalid;
        }
        if delta_t < self.minimum_interval {
            return Interval::TooShort;
        }
        utilization(anchor, latest).map_or(Interval::Invalid, Interval::Usable)
    }

    /// Most recent good sample pulled from the source.
    pub fn last_sample(&self) -> Option<Sample> {
        self.latest
    }

    /// Forget all history; the next call behaves like the first.
    pub fn reset(&mut self) {
        self.oldest = None;
        self.interim = None;
        self.latest = None;
    }
}

enum Interval {
    Usable(f64),
    TooShort,
    Invalid,
}

/// Load between `anchor` and `latest`, or `None` if the pair is unusable.
fn utilization(anchor: &Sample, latest: &Sample) -> Option<f64> {
    let delta_t = latest.timestamp.checked_sub(anchor.timestamp)?;
    let delta_cpu = latest.cpu_time.checked_sub(anchor.cpu_time)?;
    if delta_t <= 0 || delta_cpu < 0 || latest.number_of_cpus < 1 {
        return None;
    }
    let capacity = f64::from(latest.number_of_cpus) * delta_t as f64;
    Some((delta_cpu as f64 / capacity).min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;
    use mx_core::sample::INSUFFICIENT_PRIVILEGE;

    fn estimator(samples: impl IntoIterator<Item = Sample>) -> CpuLoadEstimator<ScriptedSource> {
        CpuLoadEstimator::with_minimum_interval(ScriptedSource::new(samples), 10)
    }

    #[test]
    fn first_call_has_no_history() {
        let mut est = estimator([Sample::new(1_000, 500, 4)]);
        assert_eq!(est.sample(), CpuLoad::NotYetAvailable);
        assert_eq!(est.oldest, est.interim);
        assert!(est.oldest.is_some());
    }

    #[test]
    fn quarter_load_on_four_cpus() {
        let mut est = estimator([Sample::new(0, 0, 4), Sample::new(100, 100, 4)]);
        est.sample();
        assert_eq!(est.sample(), CpuLoad::Load(0.25));
        assert_eq!(est.oldest, Some(Sample::new(0, 0, 4)));
        assert_eq!(est.interim, Some(Sample::new(100, 100, 4)));
    }

    #[test]
    fn load_is_clamped_to_one() {
        let mut est = estimator([Sample::new(0, 0, 1), Sample::new(10, 50, 1)]);
        est.sample();
        assert_eq!(est.sample(), CpuLoad::Load(1.0));
    }

    #[test]
    fn short_intervals_yield_no_reading() {
        let mut est = estimator([Sample::new(0, 0, 1), Sample::new(5, 1, 1)]);
        est.sample();
        assert_eq!(est.sample(), CpuLoad::NotYetAvailable);
        assert_eq!(est.interim, Some(Sample::new(0, 0, 1)));
        assert_eq!(est.oldest, Some(Sample::new(0, 0, 1)));
    }

    #[test]
    fn short_interim_interval_falls_back_to_oldest() {
        let mut est = estimator([
            Sample::new(0, 0, 1),
            Sample::new(100, 50, 1),
            Sample::new(105, 52, 1),
        ]);
        est.sample();
        assert_eq!(est.sample(), CpuLoad::Load(0.5));
        assert_eq!(est.sample(), CpuLoad::Load(52.0 / 105.0));
        // Neither anchor moves on a fallback reading.
        assert_eq!(est.oldest, Some(Sample::new(0, 0, 1)));
        assert_eq!(est.interim, Some(Sample::new(100, 50, 1)));
    }

    #[test]
    fn cpu_regression_advances_interim_and_retries_oldest() {
        let mut est = estimator([
            Sample::new(0, 0, 1),
            Sample::new(100, 50, 1),
            Sample::new(200, 40, 1),
        ]);
        est.sample();
        est.sample();
        assert_eq!(est.sample(), CpuLoad::Load(0.2));
        assert_eq!(est.oldest, Some(Sample::new(0, 0, 1)));
        assert_eq!(est.interim, Some(Sample::new(200, 40, 1)));
    }

    #[test]
    fn invalid_oldest_anchor_is_dropped() {
        let mut est = estimator([
            Sample::new(0, 100, 1),
            Sample::new(100, 150, 1),
            Sample::new(200, 50, 1),
        ]);
        est.sample();
        assert_eq!(est.sample(), CpuLoad::Load(0.5));
        assert_eq!(est.sample(), CpuLoad::NotYetAvailable);
        assert_eq!(est.oldest, Some(Sample::new(200, 50, 1)));
        assert_eq!(est.interim, Some(Sample::new(200, 50, 1)));
    }

    #[test]
    fn recovers_after_dropping_anchors() {
        let mut est = estimator([
            Sample::new(0, 100, 1),
            Sample::new(100, 150, 1),
            Sample::new(200, 50, 1),
            Sample::new(300, 80, 1),
        ]);
        for _ in 0..3 {
            est.sample();
        }
        assert_eq!(est.sample(), CpuLoad::Load(0.3));
    }

    #[test]
    fn backwards_clock_drops_both_anchors() {
        let mut est = estimator([
            Sample::new(1000, 0, 1),
            Sample::new(1100, 50, 1),
            Sample::new(500, 60, 1),
            Sample::new(520, 70, 1),
        ]);
        est.sample();
        assert_eq!(est.sample(), CpuLoad::Load(0.5));

        assert_eq!(est.sample(), CpuLoad::NotYetAvailable);
        assert_eq!(est.oldest, Some(Sample::new(500, 60, 1)));
        assert_eq!(est.interim, Some(Sample::new(500, 60, 1)));

        assert_eq!(est.sample(), CpuLoad::Load(0.5));
        assert_eq!(est.oldest, Some(Sample::new(500, 60, 1)));
        assert_eq!(est.interim, Some(Sample::new(520, 70, 1)));
    }

    #[test]
    fn backwards_clock_against_interim_only_falls_back_to_oldest() {
        let mut est = estimator([
            Sample::new(0, 0, 1),
            Sample::new(100, 50, 1),
            Sample::new(90, 60, 1),
        ]);
        est.sample();
        est.sample();
        assert_eq!(est.sample(), CpuLoad::Load(60.0 / 90.0));
        assert_eq!(est.oldest, Some(Sample::new(0, 0, 1)));
        assert_eq!(est.interim, Some(Sample::new(90, 60, 1)));
    }

    #[test]
    fn overflowing_interval_is_an_invalid_pair() {
        let mut est = estimator([Sample::new(i64::MIN, 0, 1), Sample::new(i64::MAX, 10, 1)]);
        est.sample();
        assert_eq!(est.sample(), CpuLoad::NotYetAvailable);
        assert_eq!(est.oldest, Some(Sample::new(i64::MAX, 10, 1)));
        assert_eq!(est.interim, Some(Sample::new(i64::MAX, 10, 1)));
    }

    #[test]
    fn overflowing_cpu_delta_is_an_invalid_pair() {
        let mut est = estimator([Sample::new(0, i64::MIN, 1), Sample::new(100, i64::MAX, 1)]);
        est.sample();
        assert_eq!(est.sample(), CpuLoad::NotYetAvailable);
        assert_eq!(est.oldest, Some(Sample::new(100, i64::MAX, 1)));
    }

    #[test]
    fn zero_processors_is_invalid() {
        let mut est = estimator([Sample::new(0, 0, 0), Sample::new(100, 10, 0)]);
        est.sample();
        assert_eq!(est.sample(), CpuLoad::NotYetAvailable);
    }

    #[test]
    fn negative_status_passes_through_without_touching_state() {
        let mut est = estimator([
            Sample::new(0, 0, 2),
            Sample::with_status(INSUFFICIENT_PRIVILEGE),
            Sample::new(100, 100, 2),
        ]);
        est.sample();
        let before = (est.oldest, est.interim, est.latest);
        assert_eq!(est.sample(), CpuLoad::Unavailable(-2));
        assert_eq!((est.oldest, est.interim, est.latest), before);
        assert_eq!(est.sample(), CpuLoad::Load(0.5));
    }

    #[test]
    fn negative_status_on_fresh_estimator_keeps_it_fresh() {
        let mut est = estimator([Sample::with_status(-3), Sample::new(0, 0, 1)]);
        assert_eq!(est.sample(), CpuLoad::Unavailable(-3));
        assert!(est.oldest.is_none());
        assert_eq!(est.sample(), CpuLoad::NotYetAvailable);
    }

    #[test]
    fn source_failure_is_an_internal_error() {
        let mut source = ScriptedSource::new([Sample::new(0, 0, 1)]);
        source.push_failure();
        source.push(Sample::new(100, 25, 1));
        let mut est = CpuLoadEstimator::with_minimum_interval(source, 10);

        est.sample();
        assert_eq!(est.sample(), CpuLoad::InternalError);
        assert_eq!(est.last_sample(), Some(Sample::new(0, 0, 1)));
        assert_eq!(est.sample(), CpuLoad::Load(0.25));
    }

    #[test]
    fn reset_forgets_history() {
        let mut est = estimator([Sample::new(0, 0, 1), Sample::new(100, 10, 1)]);
        est.sample();
        est.reset();
        assert_eq!(est.sample(), CpuLoad::NotYetAvailable);
        assert!(est.last_sample().is_some());
    }

    #[test]
    fn default_minimum_interval_is_ten_milliseconds() {
        let mut est = CpuLoadEstimator::new(ScriptedSource::new([
            Sample::new(0, 0, 1),
            Sample::new(9_999_999, 1, 1),
            Sample::new(10_000_000, 5_000_000, 1),
        ]));
        est.sample();
        assert_eq!(est.sample(), CpuLoad::NotYetAvailable);
        assert_eq!(est.sample(), CpuLoad::Load(0.5));
    }

    #[test]
    fn valid_readings_stay_in_unit_range() {
        // Deterministic LCG so the sequence is reproducible.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = |bound: i64| {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            ((seed >> 33) as i64) % bound
        };

        let mut source = ScriptedSource::default();
        let (mut t, mut cpu) = (0i64, 0i64);
        for _ in 0..500 {
            t += next(50);
            cpu += next(400);
            source.push(Sample::new(t, cpu, 1 + next(8) as i32));
        }

        let mut est = CpuLoadEstimator::with_minimum_interval(source, 10);
        for _ in 0..500 {
            if let CpuLoad::Load(v) = est.sample() {
                assert!((0.0..=1.0).contains(&v), "load {v} out of range");
            }
        }
    }
}
