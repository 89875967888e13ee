//! Phase orchestration: setup, run, verify, teardown.

use std::sync::Arc;
use std::time::Duration;

use dbbench_core::{CoreError, CoreResult, Driver, EngineConfig, RunResult};
use tracing::{info, warn};

use crate::latency::LatencyRecorder;
use crate::outcome::{AttemptStatus, RetryPolicy};
use crate::pool::{PoolConfig, WorkerContext, WorkerPool};
use crate::stop::StopSignal;
use crate::workload::Workload;

/// Parameters of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub concurrency: usize,
    /// `None` runs until the workload's terminal condition.
    pub duration: Option<Duration>,
}

/// Drives a workload through its phases and assembles the result.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: EngineConfig,
}

impl Runner {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `workload` with `concurrency` workers for at most `duration`.
    pub async fn run(
        &self,
        driver: Arc<dyn Driver>,
        workload: Arc<dyn Workload>,
        concurrency: usize,
        duration: Duration,
    ) -> CoreResult<RunResult> {
        self.run_with(
            driver,
            workload,
            RunConfig {
                concurrency,
                duration: Some(duration),
            },
        )
        .await
    }

    pub async fn run_with(
        &self,
        driver: Arc<dyn Driver>,
        workload: Arc<dyn Workload>,
        run: RunConfig,
    ) -> CoreResult<RunResult> {
        if run.concurrency == 0 {
            return Err(CoreError::InvalidConfig(
                "concurrency must be greater than zero".to_string(),
            ));
        }
        let template = LatencyRecorder::new(&self.config.latency)?;
        let name = workload.name().to_string();
        let backend = driver.backend();

        info!(workload = %name, %backend, "Setup started");
        workload
            .setup(driver.as_ref())
            .await
            .map_err(CoreError::setup_failed)?;
        info!(workload = %name, "Setup complete");

        let retry = workload
            .retry_policy()
            .unwrap_or_else(|| RetryPolicy::from(self.config.retry));
        let pool = WorkerPool::new(
            PoolConfig {
                concurrency: run.concurrency,
                deadline: run.duration,
                shutdown_grace: self.config.shutdown_grace,
                retry,
            },
            template,
        );

        info!(
            workload = %name,
            concurrency = run.concurrency,
            duration = ?run.duration,
            "Run started"
        );
        let attempt_fn = {
            let driver = Arc::clone(&driver);
            let workload = Arc::clone(&workload);
            move |ctx: WorkerContext| {
                let driver = Arc::clone(&driver);
                let workload = Arc::clone(&workload);
                async move {
                    match workload.attempt(driver.as_ref(), &ctx).await {
                        Ok(()) => AttemptStatus::Success,
                        Err(e) => workload.classify(&e),
                    }
                }
            }
        };
        let report = pool.run(Arc::new(StopSignal::new()), attempt_fn).await;
        info!(
            workload = %name,
            operations = report.totals.operations,
            errors = report.totals.errors,
            transient_retries = report.totals.transient_retries,
            total_time = ?report.total_time,
            stop_cause = ?report.stop_cause,
            panicked_workers = report.panicked_workers,
            "Run finished"
        );

        let data_integrity = match workload.verify(driver.as_ref()).await {
            Ok(Some(true)) | Ok(None) => true,
            Ok(Some(false)) => {
                warn!(workload = %name, "Data integrity check failed");
                false
            }
            Err(e) => {
                warn!(workload = %name, error = %e, "Data integrity check could not complete");
                false
            }
        };

        if let Err(e) = workload.teardown(driver.as_ref()).await {
            let e = CoreError::teardown_failed(e);
            warn!(workload = %name, error = %e, "Teardown failed");
        } else {
            info!(workload = %name, "Teardown complete");
        }

        Ok(report.finalize(data_integrity))
    }
}
