//! Phase orchestration tests against an in-test driver.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbbench_core::{
    BackendKind, CoreError, CoreResult, Driver, EngineConfig, ExecResult, Row, Statement,
    StopCause, TxFn,
};
use dbbench_engine::{RetryPolicy, RunConfig, Runner, WorkerContext, Workload};

/// Driver that accepts everything and stores nothing; workloads below keep
/// their state in atomics.
struct NullDriver;

#[async_trait]
impl Driver for NullDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn connect(&self, _dsn: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn close(&self) -> CoreResult<()> {
        Ok(())
    }

    async fn reset(&self) -> CoreResult<()> {
        Ok(())
    }

    async fn execute_tx(&self, _f: TxFn<'_>) -> CoreResult<()> {
        Err(CoreError::Unsupported("transactions".into()))
    }

    async fn exec(&self, _stmt: &Statement) -> CoreResult<ExecResult> {
        Ok(ExecResult::default())
    }

    async fn query(&self, _stmt: &Statement) -> CoreResult<Vec<Row>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct Calls {
    setup: AtomicUsize,
    attempts: AtomicU64,
    verify: AtomicUsize,
    teardown: AtomicUsize,
}

/// Decrements a shared counter until it reaches zero.
struct Countdown {
    remaining: AtomicI64,
    calls: Calls,
}

impl Countdown {
    fn new(start: i64) -> Self {
        Self {
            remaining: AtomicI64::new(start),
            calls: Calls::default(),
        }
    }
}

#[async_trait]
impl Workload for Countdown {
    fn name(&self) -> &str {
        "countdown"
    }

    async fn setup(&self, _driver: &dyn Driver) -> CoreResult<()> {
        self.calls.setup.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn attempt(&self, _driver: &dyn Driver, _ctx: &WorkerContext) -> CoreResult<()> {
        self.calls.attempts.fetch_add(1, Ordering::SeqCst);
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| (v > 0).then_some(v - 1))
            .map(|_| ())
            .map_err(|_| CoreError::exhausted("counter"))
    }

    async fn verify(&self, _driver: &dyn Driver) -> CoreResult<Option<bool>> {
        self.calls.verify.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.remaining.load(Ordering::SeqCst) == 0))
    }

    async fn teardown(&self, _driver: &dyn Driver) -> CoreResult<()> {
        self.calls.teardown.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every attempt; optionally fails setup, verify or teardown.
#[derive(Default)]
struct Failing {
    fail_setup: bool,
    fail_verify: bool,
    fail_teardown: bool,
    calls: Calls,
}

#[async_trait]
impl Workload for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn setup(&self, _driver: &dyn Driver) -> CoreResult<()> {
        self.calls.setup.fetch_add(1, Ordering::SeqCst);
        if self.fail_setup {
            return Err(CoreError::Backend("relation already exists".into()));
        }
        Ok(())
    }

    async fn attempt(&self, _driver: &dyn Driver, _ctx: &WorkerContext) -> CoreResult<()> {
        self.calls.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        Err(CoreError::Backend("constraint violation".into()))
    }

    async fn verify(&self, _driver: &dyn Driver) -> CoreResult<Option<bool>> {
        self.calls.verify.fetch_add(1, Ordering::SeqCst);
        if self.fail_verify {
            return Err(CoreError::connection("lost connection"));
        }
        Ok(None)
    }

    async fn teardown(&self, _driver: &dyn Driver) -> CoreResult<()> {
        self.calls.teardown.fetch_add(1, Ordering::SeqCst);
        if self.fail_teardown {
            return Err(CoreError::Backend("drop failed".into()));
        }
        Ok(())
    }
}

/// Every attempt conflicts once before succeeding.
struct ConflictOnce {
    limit: Option<RetryPolicy>,
}

#[async_trait]
impl Workload for ConflictOnce {
    fn name(&self) -> &str {
        "conflict_once"
    }

    async fn setup(&self, _driver: &dyn Driver) -> CoreResult<()> {
        Ok(())
    }

    async fn attempt(&self, _driver: &dyn Driver, ctx: &WorkerContext) -> CoreResult<()> {
        tokio::task::yield_now().await;
        if ctx.retry == 0 {
            return Err(CoreError::conflict("40001", "could not serialize access"));
        }
        Ok(())
    }

    async fn teardown(&self, _driver: &dyn Driver) -> CoreResult<()> {
        Ok(())
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        self.limit
    }
}

fn driver() -> Arc<dyn Driver> {
    Arc::new(NullDriver)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contention_stops_at_terminal_condition() {
    let workload = Arc::new(Countdown::new(100));
    let result = Runner::default()
        .run_with(
            driver(),
            workload.clone(),
            RunConfig {
                concurrency: 10,
                duration: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.operations, 100);
    assert_eq!(result.errors, 0);
    assert_eq!(result.error_rate, 0.0);
    assert!(result.data_integrity);
    assert_eq!(result.stop_cause, Some(StopCause::TerminalConditionMet));
    assert_eq!(workload.calls.verify.load(Ordering::SeqCst), 1);
    assert_eq!(workload.calls.teardown.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deadline_bounds_total_time() {
    let workload = Arc::new(Countdown::new(i64::MAX));
    let result = Runner::default()
        .run(driver(), workload, 8, Duration::from_millis(200))
        .await
        .unwrap();

    assert!(result.operations > 0);
    assert!(result.throughput > 0.0);
    assert!(result.total_time >= Duration::from_millis(200));
    assert!(result.total_time < Duration::from_secs(2));
    assert_eq!(result.stop_cause, Some(StopCause::DeadlineReached));
    assert!(!result.data_integrity, "counter never reached zero");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn provided_run_uses_default_engine() {
    let workload = Arc::new(Countdown::new(25));
    let result = workload
        .clone()
        .run(driver(), 3, Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(result.operations, 25);
    assert_eq!(result.stop_cause, Some(StopCause::TerminalConditionMet));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn teardown_runs_once_after_errors() {
    let workload = Arc::new(Failing {
        fail_teardown: true,
        ..Default::default()
    });
    let result = Runner::default()
        .run(driver(), workload.clone(), 4, Duration::from_millis(50))
        .await
        .unwrap();

    assert!(result.errors > 0);
    assert_eq!(result.operations, 0);
    assert_eq!(result.error_rate, 1.0);
    assert!(result.data_integrity, "no invariant declared");
    assert_eq!(workload.calls.teardown.load(Ordering::SeqCst), 1);
    assert_eq!(workload.calls.verify.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn setup_failure_skips_run_and_teardown() {
    let workload = Arc::new(Failing {
        fail_setup: true,
        ..Default::default()
    });
    let err = Runner::default()
        .run(driver(), workload.clone(), 4, Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::SetupFailed { .. }));
    assert_eq!(workload.calls.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(workload.calls.verify.load(Ordering::SeqCst), 0);
    assert_eq!(workload.calls.teardown.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn verify_error_means_integrity_false() {
    let workload = Arc::new(Failing {
        fail_verify: true,
        ..Default::default()
    });
    let result = Runner::default()
        .run(driver(), workload.clone(), 2, Duration::from_millis(20))
        .await
        .unwrap();

    assert!(!result.data_integrity);
    assert_eq!(workload.calls.teardown.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_concurrency_rejected_before_setup() {
    let workload = Arc::new(Countdown::new(1));
    let err = Runner::default()
        .run(driver(), workload.clone(), 0, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidConfig(_)));
    assert_eq!(workload.calls.setup.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_conflicts_are_retried_not_counted() {
    let result = Runner::default()
        .run(
            driver(),
            Arc::new(ConflictOnce { limit: None }),
            4,
            Duration::from_millis(100),
        )
        .await
        .unwrap();

    assert!(result.operations > 0);
    assert_eq!(result.errors, 0);
    // Every tallied retry is followed by the succeeding second try; a conflict
    // seen after stop is abandoned without being tallied.
    assert_eq!(result.transient_retries, result.operations);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workload_retry_ceiling_overrides_engine() {
    let mut config = EngineConfig::default();
    config.retry.max_retries = None;
    let result = Runner::new(config)
        .run(
            driver(),
            Arc::new(ConflictOnce {
                limit: Some(RetryPolicy::with_max_retries(0)),
            }),
            2,
            Duration::from_millis(50),
        )
        .await
        .unwrap();

    assert_eq!(result.operations, 0);
    assert!(result.errors > 0);
    assert_eq!(result.transient_retries, 0);
}
