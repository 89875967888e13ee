use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dbbench_core::{BackendKind, CoreError, CoreResult, Driver};
use dbbench_engine::{WorkerContext, Workload};
use tracing::debug;
use uuid::Uuid;

use super::queries::{self, AnalyticsQueries, Event};
use crate::support::exec_in_tx;

pub const DEFAULT_EVENTS: usize = 10_000;
/// Trailing window the dashboard aggregates over.
pub const DEFAULT_WINDOW_SECS: i64 = 3600;

/// Aggregation reads: each attempt sums the metric per region over the
/// trailing window. Declares no invariant.
pub struct DashboardQuery {
    queries: Box<dyn AnalyticsQueries>,
    events: usize,
    window: chrono::Duration,
}

impl DashboardQuery {
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            queries: queries::for_backend(backend),
            events: DEFAULT_EVENTS,
            window: chrono::Duration::seconds(DEFAULT_WINDOW_SECS),
        }
    }

    /// Number of events seeded before the run.
    #[must_use]
    pub fn with_events(mut self, events: usize) -> Self {
        self.events = events;
        self
    }

    pub fn with_window(mut self, window: Duration) -> CoreResult<Self> {
        self.window = chrono::Duration::from_std(window)
            .map_err(|e| CoreError::InvalidConfig(format!("dashboard window: {e}")))?;
        Ok(self)
    }
}

#[async_trait]
impl Workload for DashboardQuery {
    fn name(&self) -> &str {
        "dashboard_query"
    }

    async fn setup(&self, driver: &dyn Driver) -> CoreResult<()> {
        let mut statements = self.queries.create_schema();
        let now = Utc::now();
        statements.extend((0..self.events).map(|i| {
            self.queries
                .insert_event(&Event::synthetic(Uuid::new_v4().to_string(), i, now))
        }));
        exec_in_tx(driver, statements).await?;
        debug!(events = self.events, "Seeded analytics events");
        Ok(())
    }

    async fn attempt(&self, driver: &dyn Driver, _ctx: &WorkerContext) -> CoreResult<()> {
        let cutoff = Utc::now() - self.window;
        driver.query(&self.queries.regional_totals(cutoff)).await?;
        Ok(())
    }

    async fn teardown(&self, driver: &dyn Driver) -> CoreResult<()> {
        exec_in_tx(driver, self.queries.drop_schema()).await
    }
}
