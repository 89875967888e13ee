//! HDR latency recorder.

use std::time::Duration;

use dbbench_core::{CoreError, CoreResult, LatencyConfig};
use hdrhistogram::Histogram;

/// Latency histogram in microseconds.
///
/// Workers record into a [`local`](Self::local) copy and merge it into the
/// shared recorder once, on exit.
#[derive(Debug, Clone)]
pub struct LatencyRecorder {
    histogram: Histogram<u64>,
}

impl LatencyRecorder {
    /// Creates an empty recorder covering `1..=max_micros`.
    pub fn new(config: &LatencyConfig) -> CoreResult<Self> {
        let histogram =
            Histogram::new_with_bounds(1, config.max_micros, config.significant_figures)
                .map_err(|e| CoreError::InvalidConfig(format!("latency histogram: {e:?}")))?;
        Ok(Self { histogram })
    }

    /// An empty recorder with the same range and precision.
    #[must_use]
    pub fn local(&self) -> Self {
        Self {
            histogram: Histogram::new_from(&self.histogram),
        }
    }

    /// Records one latency. Values above the range saturate at the maximum.
    pub fn record(&mut self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.record_micros(micros);
    }

    pub fn record_micros(&mut self, micros: u64) {
        self.histogram.saturating_record(micros);
    }

    /// Adds every sample of `other`.
    pub fn merge(&mut self, other: &LatencyRecorder) -> CoreResult<()> {
        self.histogram
            .add(&other.histogram)
            .map_err(|e| CoreError::internal(format!("latency merge: {e:?}")))
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Arithmetic mean, zero when empty.
    #[must_use]
    pub fn mean(&self) -> Duration {
        if self.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.histogram.mean() / 1_000_000.0)
    }

    /// Value at quantile `q` (clamped to `0.0..=1.0`), zero when empty.
    #[must_use]
    pub fn quantile(&self, q: f64) -> Duration {
        if self.is_empty() {
            return Duration::ZERO;
        }
        let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };
        Duration::from_micros(self.histogram.value_at_quantile(q))
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        if self.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_micros(self.histogram.max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn recorder() -> LatencyRecorder {
        LatencyRecorder::new(&LatencyConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_recorder_reports_zero() {
        let rec = recorder();
        assert!(rec.is_empty());
        assert_eq!(rec.mean(), Duration::ZERO);
        assert_eq!(rec.quantile(0.95), Duration::ZERO);
        assert_eq!(rec.quantile(0.99), Duration::ZERO);
    }

    #[test]
    fn test_out_of_range_saturates() {
        let mut rec = LatencyRecorder::new(&LatencyConfig {
            max_micros: 1_000,
            significant_figures: 3,
        })
        .unwrap();
        rec.record(Duration::from_secs(10));
        assert_eq!(rec.len(), 1);
        assert!(rec.max() <= Duration::from_micros(1_001));
        assert!(rec.max() >= Duration::from_micros(999));
    }

    #[test]
    fn test_merge_local_copies() {
        let shared = recorder();
        let mut a = shared.local();
        let mut b = shared.local();
        for _ in 0..90 {
            a.record_micros(100);
        }
        for _ in 0..10 {
            b.record_micros(10_000);
        }

        let mut merged = shared.local();
        merged.merge(&a).unwrap();
        merged.merge(&b).unwrap();

        assert_eq!(merged.len(), 100);
        let p50 = merged.quantile(0.50).as_micros();
        let p99 = merged.quantile(0.99).as_micros();
        assert!((99..=101).contains(&p50), "p50 = {p50}");
        assert!((9_990..=10_010).contains(&p99), "p99 = {p99}");
    }

    #[test]
    fn test_invalid_precision_rejected() {
        let config = LatencyConfig {
            max_micros: 1_000,
            significant_figures: 9,
        };
        assert!(LatencyRecorder::new(&config).is_err());
    }

    proptest! {
        #[test]
        fn prop_quantiles_are_monotonic(samples in prop::collection::vec(1u64..5_000_000, 1..200)) {
            let mut rec = recorder();
            for s in &samples {
                rec.record_micros(*s);
            }
            let qs = [0.0, 0.25, 0.5, 0.9, 0.95, 0.99, 1.0];
            for pair in qs.windows(2) {
                prop_assert!(rec.quantile(pair[0]) <= rec.quantile(pair[1]));
            }
        }

        #[test]
        fn prop_identical_samples_collapse_to_value(v in 1u64..5_000_000, n in 1usize..2_000) {
            let config = LatencyConfig::default();
            let mut rec = LatencyRecorder::new(&config).unwrap();
            for _ in 0..n {
                rec.record_micros(v);
            }
            // One bucket at the configured precision, plus a microsecond of rounding.
            let precision = 10f64.powi(-i32::from(config.significant_figures));
            let tolerance = v as f64 * precision + 1.0;
            let micros = |d: Duration| d.as_secs_f64() * 1_000_000.0;
            for q in [0.95, 0.99] {
                let observed = micros(rec.quantile(q));
                prop_assert!((observed - v as f64).abs() <= tolerance, "p{} = {}", q, observed);
            }
            let mean = micros(rec.mean());
            prop_assert!((mean - v as f64).abs() <= tolerance, "mean = {}", mean);
        }

        #[test]
        fn prop_mean_within_recorded_range(samples in prop::collection::vec(1u64..5_000_000, 1..200)) {
            let mut rec = recorder();
            for s in &samples {
                rec.record_micros(*s);
            }
            let min = *samples.iter().min().unwrap() as f64;
            let max = *samples.iter().max().unwrap() as f64;
            let mean = rec.mean().as_secs_f64() * 1_000_000.0;
            // Bucket precision at three significant figures.
            prop_assert!(mean >= min * 0.998 && mean <= max * 1.002);
        }
    }
}
