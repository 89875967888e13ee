//! Worker pool / load generator.
//!
//! Spawns `concurrency` tokio tasks that loop until the stop signal fires.
//! Each worker keeps a local tally and histogram and flushes them exactly
//! once on exit, including when it panics.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dbbench_core::{RunResult, StopCause};
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::aggregator::{ResultAggregator, WorkerTally};
use crate::latency::LatencyRecorder;
use crate::outcome::{AttemptStatus, RetryPolicy, WorkerOutcome};
use crate::stop::StopSignal;

/// Identifies the attempt a worker is about to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerContext {
    /// Worker index in `0..concurrency`.
    pub worker_id: usize,
    /// Logical attempts this worker started before this one.
    pub iteration: u64,
    /// Transient retries already spent on this logical attempt.
    pub retry: u32,
}

/// Pool parameters for one run.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub concurrency: usize,
    /// `None` runs until a worker reports the terminal condition.
    pub deadline: Option<Duration>,
    pub shutdown_grace: Duration,
    pub retry: RetryPolicy,
}

/// What the pool observed once every worker has exited.
#[derive(Debug)]
pub struct PoolReport {
    pub totals: WorkerTally,
    pub latency: LatencyRecorder,
    pub total_time: Duration,
    pub panicked_workers: usize,
    pub stop_cause: Option<StopCause>,
    aggregator: Arc<ResultAggregator>,
}

impl PoolReport {
    /// Assembles the final record with the verifier's verdict.
    #[must_use]
    pub fn finalize(&self, data_integrity: bool) -> RunResult {
        let mut result = self.aggregator.finalize(
            self.total_time,
            &self.latency,
            data_integrity,
            self.stop_cause,
        );
        result.panicked_workers = self.panicked_workers as u64;
        result
    }
}

struct Shared {
    aggregator: Arc<ResultAggregator>,
    latency: Mutex<LatencyRecorder>,
}

/// Flushes a worker's local state into [`Shared`] when dropped.
struct FlushGuard {
    worker_id: usize,
    tally: WorkerTally,
    local: LatencyRecorder,
    shared: Arc<Shared>,
}

impl FlushGuard {
    fn observe(&mut self, outcome: WorkerOutcome) {
        self.tally.observe(outcome.status);
        if outcome.status.is_counted() {
            self.local.record(outcome.latency);
        }
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        self.shared.aggregator.merge(&self.tally);
        if let Err(e) = self.shared.latency.lock().merge(&self.local) {
            warn!(worker_id = self.worker_id, error = %e, "Failed to merge worker latencies");
        }
        debug!(
            worker_id = self.worker_id,
            operations = self.tally.operations,
            errors = self.tally.errors,
            transient_retries = self.tally.transient_retries,
            "Worker exited"
        );
    }
}

/// Fixed-size pool of cooperative workers.
pub struct WorkerPool {
    config: PoolConfig,
    template: LatencyRecorder,
}

impl WorkerPool {
    /// `template` fixes the histogram range of every worker.
    #[must_use]
    pub fn new(config: PoolConfig, template: LatencyRecorder) -> Self {
        Self { config, template }
    }

    /// Runs workers until `stop` fires and all of them have exited.
    ///
    /// In-flight attempts are awaited, never aborted; an attempt that
    /// completes after the deadline is still recorded.
    pub async fn run<F, Fut>(&self, stop: Arc<StopSignal>, attempt_fn: F) -> PoolReport
    where
        F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AttemptStatus> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            aggregator: Arc::new(ResultAggregator::new()),
            latency: Mutex::new(self.template.local()),
        });
        let attempt_fn = Arc::new(attempt_fn);
        let started = Instant::now();

        let timer = self.config.deadline.map(|deadline| {
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                if stop.fire(StopCause::DeadlineReached) {
                    info!(?deadline, "Deadline reached, stopping workers");
                }
            })
        });

        let handles: Vec<JoinHandle<()>> = (0..self.config.concurrency)
            .map(|worker_id| {
                let guard = FlushGuard {
                    worker_id,
                    tally: WorkerTally::default(),
                    local: self.template.local(),
                    shared: Arc::clone(&shared),
                };
                tokio::spawn(worker_loop(
                    guard,
                    Arc::clone(&stop),
                    Arc::clone(&attempt_fn),
                    self.config.retry,
                ))
            })
            .collect();

        let mut drain = Box::pin(join_all(handles));
        let joined = tokio::select! {
            joined = &mut drain => joined,
            () = stop.fired() => {
                match tokio::time::timeout(self.config.shutdown_grace, &mut drain).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(
                            grace = ?self.config.shutdown_grace,
                            "Workers still running after shutdown grace period; waiting for in-flight attempts"
                        );
                        drain.await
                    }
                }
            }
        };
        let total_time = started.elapsed();

        if let Some(timer) = timer {
            timer.abort();
        }

        let mut panicked_workers = 0;
        for (worker_id, result) in joined.into_iter().enumerate() {
            if let Err(e) = result {
                if e.is_panic() {
                    panicked_workers += 1;
                    error!(worker_id, "Worker panicked");
                } else {
                    warn!(worker_id, error = %e, "Worker task cancelled");
                }
            }
        }

        let latency = std::mem::replace(&mut *shared.latency.lock(), self.template.local());
        let aggregator = Arc::clone(&shared.aggregator);

        PoolReport {
            totals: aggregator.snapshot(),
            latency,
            total_time,
            panicked_workers,
            stop_cause: stop.cause(),
            aggregator,
        }
    }
}

async fn worker_loop<F, Fut>(
    mut guard: FlushGuard,
    stop: Arc<StopSignal>,
    attempt_fn: Arc<F>,
    retry: RetryPolicy,
) where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AttemptStatus> + Send + 'static,
{
    let mut iteration = 0u64;

    while !stop.is_fired() {
        let started = Instant::now();
        let mut retries = 0u32;

        let status = loop {
            let ctx = WorkerContext {
                worker_id: guard.worker_id,
                iteration,
                retry: retries,
            };
            match attempt_fn(ctx).await {
                AttemptStatus::TransientRetry => {
                    if stop.is_fired() {
                        // Abandoned mid-retry: neither an operation nor an error.
                        break None;
                    }
                    if !retry.allows(retries) {
                        break Some(AttemptStatus::CountedError);
                    }
                    retries += 1;
                    guard.tally.observe(AttemptStatus::TransientRetry);
                    if !retry.backoff.is_zero() {
                        tokio::select! {
                            () = tokio::time::sleep(retry.backoff) => {}
                            () = stop.fired() => {}
                        }
                        if stop.is_fired() {
                            break None;
                        }
                    }
                }
                other => break Some(other),
            }
        };
        iteration += 1;

        match status {
            Some(AttemptStatus::TerminalStop) => {
                if stop.fire(StopCause::TerminalConditionMet) {
                    info!(worker_id = guard.worker_id, "Terminal condition met, stopping workers");
                }
                break;
            }
            Some(status) => guard.observe(WorkerOutcome {
                latency: started.elapsed(),
                status,
            }),
            None => break,
        }

        // Backends that complete without suspending must not starve the timer.
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbbench_core::LatencyConfig;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

    fn pool(concurrency: usize, deadline: Option<Duration>, retry: RetryPolicy) -> WorkerPool {
        WorkerPool::new(
            PoolConfig {
                concurrency,
                deadline,
                shutdown_grace: Duration::from_secs(5),
                retry,
            },
            LatencyRecorder::new(&LatencyConfig::default()).unwrap(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_terminal_stop_without_deadline() {
        let counter = Arc::new(AtomicI64::new(100));
        let c = Arc::clone(&counter);
        let report = pool(10, None, RetryPolicy::unbounded())
            .run(Arc::new(StopSignal::new()), move |_ctx| {
                let c = Arc::clone(&c);
                async move {
                    let prev = c.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                        (v > 0).then_some(v - 1)
                    });
                    match prev {
                        Ok(_) => AttemptStatus::Success,
                        Err(_) => AttemptStatus::TerminalStop,
                    }
                }
            })
            .await;

        assert_eq!(report.totals.operations, 100);
        assert_eq!(report.totals.errors, 0);
        assert_eq!(report.latency.len(), 100);
        assert_eq!(report.stop_cause, Some(StopCause::TerminalConditionMet));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_deadline_stops_workers() {
        let report = pool(8, Some(Duration::from_millis(200)), RetryPolicy::unbounded())
            .run(Arc::new(StopSignal::new()), |_ctx| async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                AttemptStatus::Success
            })
            .await;

        assert!(report.totals.operations > 0);
        assert!(report.total_time >= Duration::from_millis(200));
        assert!(report.total_time < Duration::from_secs(2));
        assert_eq!(report.stop_cause, Some(StopCause::DeadlineReached));
        let result = report.finalize(true);
        assert!(result.throughput > 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retry_ceiling_counts_error() {
        let report = pool(
            4,
            Some(Duration::from_millis(50)),
            RetryPolicy::with_max_retries(2),
        )
        .run(Arc::new(StopSignal::new()), |_ctx| async {
            tokio::task::yield_now().await;
            AttemptStatus::TransientRetry
        })
        .await;

        let t = report.totals;
        assert_eq!(t.operations, 0);
        assert!(t.errors > 0);
        assert!(t.transient_retries >= 2 * t.errors);
        assert!(t.transient_retries <= 2 * t.errors + 2 * 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transient_retries_not_counted() {
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        let report = pool(1, None, RetryPolicy::unbounded())
            .run(Arc::new(StopSignal::new()), move |ctx| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    if ctx.iteration == 10 {
                        AttemptStatus::TerminalStop
                    } else if ctx.retry < 3 {
                        AttemptStatus::TransientRetry
                    } else {
                        AttemptStatus::Success
                    }
                }
            })
            .await;

        assert_eq!(report.totals.operations, 10);
        assert_eq!(report.totals.transient_retries, 30);
        assert_eq!(report.totals.errors, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 41);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panicking_worker_is_reported() {
        let report = pool(4, Some(Duration::from_millis(100)), RetryPolicy::unbounded())
            .run(Arc::new(StopSignal::new()), |ctx| async move {
                if ctx.worker_id == 0 && ctx.iteration == 3 {
                    panic!("worker 0 crashed");
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
                AttemptStatus::Success
            })
            .await;

        assert_eq!(report.panicked_workers, 1);
        assert_eq!(report.finalize(true).panicked_workers, 1);
        // Worker 0 flushed its three successes before unwinding.
        assert!(report.totals.operations >= 3);
        assert_eq!(report.latency.len(), report.totals.operations);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_straggler_is_awaited_past_grace() {
        let pool = WorkerPool::new(
            PoolConfig {
                concurrency: 1,
                deadline: Some(Duration::from_millis(20)),
                shutdown_grace: Duration::from_millis(50),
                retry: RetryPolicy::unbounded(),
            },
            LatencyRecorder::new(&LatencyConfig::default()).unwrap(),
        );
        let report = pool
            .run(Arc::new(StopSignal::new()), |_ctx| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                AttemptStatus::Success
            })
            .await;

        assert_eq!(report.totals.operations, 1);
        assert!(report.total_time >= Duration::from_millis(300));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_backoff_is_cut_short_by_stop() {
        let stop = Arc::new(StopSignal::new());
        let after_stop = Arc::new(AtomicU64::new(0));
        let (s, a) = (Arc::clone(&stop), Arc::clone(&after_stop));
        let report = pool(
            1,
            Some(Duration::from_millis(50)),
            RetryPolicy::unbounded().with_backoff(Duration::from_millis(400)),
        )
        .run(Arc::clone(&stop), move |ctx| {
            let (s, a) = (Arc::clone(&s), Arc::clone(&a));
            async move {
                if s.is_fired() {
                    a.fetch_add(1, Ordering::SeqCst);
                }
                if ctx.retry == 0 {
                    AttemptStatus::TransientRetry
                } else {
                    AttemptStatus::Success
                }
            }
        })
        .await;

        assert_eq!(after_stop.load(Ordering::SeqCst), 0);
        assert_eq!(report.totals.operations, 0);
        assert_eq!(report.totals.transient_retries, 1);
        assert!(report.total_time < Duration::from_millis(300));
        assert_eq!(report.stop_cause, Some(StopCause::DeadlineReached));
    }
}
