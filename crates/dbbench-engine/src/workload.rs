use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbbench_core::{CoreError, CoreResult, Driver, EngineConfig, RunResult};
use futures::future::BoxFuture;

use crate::outcome::{classify, AttemptStatus, RetryPolicy};
use crate::pool::WorkerContext;
use crate::runner::Runner;

/// A benchmark scenario.
///
/// Implementations resolve their backend-specific statements once, at
/// construction. `attempt` is called concurrently from every worker and must
/// not branch on the backend.
#[async_trait]
pub trait Workload: Send + Sync {
    /// Name used in logs, e.g. `"inventory_update"`.
    fn name(&self) -> &str;

    /// Prepares fixture state. A failure aborts the run before any worker
    /// starts and skips teardown.
    async fn setup(&self, driver: &dyn Driver) -> CoreResult<()>;

    /// One logical operation against the backend.
    async fn attempt(&self, driver: &dyn Driver, ctx: &WorkerContext) -> CoreResult<()>;

    /// Post-run integrity check, called once after every worker stopped.
    /// `None` means the workload defines no invariant.
    async fn verify(&self, _driver: &dyn Driver) -> CoreResult<Option<bool>> {
        Ok(None)
    }

    /// Removes fixture state. Called after every successful setup.
    async fn teardown(&self, driver: &dyn Driver) -> CoreResult<()>;

    /// Overrides the engine's retry policy for transient conflicts.
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }

    /// Maps an attempt error to its status.
    fn classify(&self, err: &CoreError) -> AttemptStatus {
        classify(err)
    }

    /// Runs the full setup / run / verify / teardown sequence with the
    /// default engine configuration.
    fn run(
        self: Arc<Self>,
        driver: Arc<dyn Driver>,
        concurrency: usize,
        duration: Duration,
    ) -> BoxFuture<'static, CoreResult<RunResult>>
    where
        Self: Sized + 'static,
    {
        Box::pin(async move {
            let runner = Runner::new(EngineConfig::default());
            runner.run(driver, self, concurrency, duration).await
        })
    }
}
