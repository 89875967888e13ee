//! Backend adapters implementing [`dbbench_core::Driver`].
//!
//! * [`memory::MemoryDriver`] is an in-process document store with
//!   optimistic transactions and deterministic fault injection.
//! * [`sqlite::SqliteDriver`] and [`postgres::PostgresDriver`] wrap `sqlx`
//!   connection pools.

pub mod memory;
pub mod postgres;
mod sql;
pub mod sqlite;

use std::sync::Arc;

use dbbench_core::{BackendKind, CoreResult, Driver};
use tracing::info;

pub use memory::{InjectedFault, MemoryConfig, MemoryDriver, MemoryStats};
pub use postgres::{PostgresDriver, PostgresOptions};
pub use sqlite::{SqliteDriver, SqliteOptions};

/// Builds the driver for `backend` with default pool settings, unconnected.
#[must_use]
pub fn driver_for(backend: BackendKind) -> Arc<dyn Driver> {
    match backend {
        BackendKind::Memory => Arc::new(MemoryDriver::new()),
        BackendKind::Sqlite => Arc::new(SqliteDriver::new()),
        BackendKind::Postgres => Arc::new(PostgresDriver::new()),
    }
}

/// Builds and connects the driver for `backend`.
pub async fn open(backend: BackendKind, dsn: &str) -> CoreResult<Arc<dyn Driver>> {
    let driver = driver_for(backend);
    driver.connect(dsn).await?;
    info!(%backend, "Driver connected");
    Ok(driver)
}
