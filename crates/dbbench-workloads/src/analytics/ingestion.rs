use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dbbench_core::{BackendKind, CoreError, CoreResult, Driver};
use dbbench_engine::{WorkerContext, Workload};
use tracing::{debug, warn};
use uuid::Uuid;

use super::queries::{self, AnalyticsQueries, Event};
use crate::support::exec_in_tx;

pub const DEFAULT_TARGET_EVENTS: u64 = 100_000;
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Write throughput: workers insert batches of events, one transaction per
/// batch, until the target count is stored or the deadline passes.
///
/// The stored event count must equal the number of events whose batch
/// committed.
pub struct Ingestion {
    queries: Box<dyn AnalyticsQueries>,
    target: u64,
    batch_size: usize,
    inserted: AtomicU64,
    sequence: AtomicUsize,
}

impl Ingestion {
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            queries: queries::for_backend(backend),
            target: DEFAULT_TARGET_EVENTS,
            batch_size: DEFAULT_BATCH_SIZE,
            inserted: AtomicU64::new(0),
            sequence: AtomicUsize::new(0),
        }
    }

    /// Stops the run once this many events are stored. Concurrent batches
    /// in flight may overshoot it by less than one batch per worker.
    #[must_use]
    pub fn with_target(mut self, target: u64) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Events committed so far.
    pub fn inserted(&self) -> u64 {
        self.inserted.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Workload for Ingestion {
    fn name(&self) -> &str {
        "ingestion"
    }

    async fn setup(&self, driver: &dyn Driver) -> CoreResult<()> {
        self.inserted.store(0, Ordering::Release);
        exec_in_tx(driver, self.queries.create_schema()).await
    }

    async fn attempt(&self, driver: &dyn Driver, _ctx: &WorkerContext) -> CoreResult<()> {
        if self.inserted() >= self.target {
            return Err(CoreError::exhausted("ingestion target"));
        }

        let first = self.sequence.fetch_add(self.batch_size, Ordering::Relaxed);
        let now = Utc::now();
        let batch = (first..first + self.batch_size)
            .map(|i| {
                self.queries
                    .insert_event(&Event::synthetic(Uuid::new_v4().to_string(), i, now))
            })
            .collect();
        exec_in_tx(driver, batch).await?;

        self.inserted
            .fetch_add(self.batch_size as u64, Ordering::AcqRel);
        Ok(())
    }

    async fn verify(&self, driver: &dyn Driver) -> CoreResult<Option<bool>> {
        let stored: i64 = driver
            .query_row(&self.queries.count_events())
            .await?
            .ok_or_else(|| CoreError::not_found("event count", queries::EVENTS))?
            .scan_named("count")?;
        let expected = self.inserted();
        if u64::try_from(stored).ok() != Some(expected) {
            warn!(stored, expected, "Stored event count differs from committed inserts");
            return Ok(Some(false));
        }
        debug!(stored, "Event count matches committed inserts");
        Ok(Some(true))
    }

    async fn teardown(&self, driver: &dyn Driver) -> CoreResult<()> {
        exec_in_tx(driver, self.queries.drop_schema()).await
    }
}
