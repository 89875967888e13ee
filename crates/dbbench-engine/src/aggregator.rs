//! Run-wide counters and final result assembly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dbbench_core::{RunResult, StopCause};

use crate::latency::LatencyRecorder;
use crate::outcome::AttemptStatus;

/// Counts accumulated by one worker before it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerTally {
    pub operations: u64,
    pub errors: u64,
    pub transient_retries: u64,
}

impl WorkerTally {
    /// Counts a final attempt status. Transient and terminal statuses are
    /// not part of `operations + errors`.
    pub fn observe(&mut self, status: AttemptStatus) {
        match status {
            AttemptStatus::Success => self.operations += 1,
            AttemptStatus::CountedError => self.errors += 1,
            AttemptStatus::TransientRetry => self.transient_retries += 1,
            AttemptStatus::TerminalStop => {}
        }
    }
}

/// Shared counters, merged once per worker.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    operations: AtomicU64,
    errors: AtomicU64,
    transient_retries: AtomicU64,
}

impl ResultAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, tally: &WorkerTally) {
        self.operations.fetch_add(tally.operations, Ordering::Relaxed);
        self.errors.fetch_add(tally.errors, Ordering::Relaxed);
        self.transient_retries
            .fetch_add(tally.transient_retries, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> WorkerTally {
        WorkerTally {
            operations: self.operations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            transient_retries: self.transient_retries.load(Ordering::Relaxed),
        }
    }

    /// Builds the final record.
    #[must_use]
    pub fn finalize(
        &self,
        total_time: Duration,
        latency: &LatencyRecorder,
        data_integrity: bool,
        stop_cause: Option<StopCause>,
    ) -> RunResult {
        let totals = self.snapshot();
        let attempts = totals.operations + totals.errors;

        let elapsed = total_time.as_secs_f64();
        let throughput = if elapsed > 0.0 {
            totals.operations as f64 / elapsed
        } else {
            0.0
        };
        let error_rate = if attempts > 0 {
            totals.errors as f64 / attempts as f64
        } else {
            0.0
        };

        RunResult {
            operations: totals.operations,
            errors: totals.errors,
            throughput,
            error_rate,
            p95_latency: latency.quantile(0.95),
            p99_latency: latency.quantile(0.99),
            average_latency: latency.mean(),
            total_time,
            data_integrity,
            transient_retries: totals.transient_retries,
            stop_cause,
            panicked_workers: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbbench_core::LatencyConfig;

    fn empty_latency() -> LatencyRecorder {
        LatencyRecorder::new(&LatencyConfig::default()).unwrap()
    }

    #[test]
    fn test_zero_attempts_has_zero_rates() {
        let agg = ResultAggregator::new();
        let result = agg.finalize(Duration::ZERO, &empty_latency(), true, None);
        assert_eq!(result.operations, 0);
        assert_eq!(result.throughput, 0.0);
        assert_eq!(result.error_rate, 0.0);
        assert_eq!(result.p95_latency, Duration::ZERO);
        assert!(result.data_integrity);
    }

    #[test]
    fn test_merge_sums_tallies() {
        let agg = ResultAggregator::new();
        let mut a = WorkerTally::default();
        a.observe(AttemptStatus::Success);
        a.observe(AttemptStatus::Success);
        a.observe(AttemptStatus::TransientRetry);
        let mut b = WorkerTally::default();
        b.observe(AttemptStatus::CountedError);
        b.observe(AttemptStatus::TerminalStop);

        agg.merge(&a);
        agg.merge(&b);

        let result = agg.finalize(
            Duration::from_secs(2),
            &empty_latency(),
            false,
            Some(StopCause::DeadlineReached),
        );
        assert_eq!(result.operations, 2);
        assert_eq!(result.errors, 1);
        assert_eq!(result.transient_retries, 1);
        assert_eq!(result.attempts(), 3);
        assert!((result.throughput - 1.0).abs() < f64::EPSILON);
        assert!((result.error_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(result.stop_cause, Some(StopCause::DeadlineReached));
    }

    #[test]
    fn test_error_rate_is_bounded() {
        let agg = ResultAggregator::new();
        agg.merge(&WorkerTally {
            operations: 0,
            errors: 7,
            transient_retries: 0,
        });
        let result = agg.finalize(Duration::from_millis(1), &empty_latency(), true, None);
        assert_eq!(result.error_rate, 1.0);
        assert_eq!(result.throughput, 0.0);
    }
}
