use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::row::Row;
use crate::statement::Statement;

/// Backend family a driver talks to. Workloads use it once, at construction,
/// to pick their query provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process document store.
    Memory,
    Sqlite,
    Postgres,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }

    /// True for backends that accept [`Statement::Sql`].
    #[must_use]
    pub fn is_sql(&self) -> bool {
        matches!(self, Self::Sqlite | Self::Postgres)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(crate::CoreError::InvalidConfig(format!(
                "unsupported database type `{other}`"
            ))),
        }
    }
}

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
}

/// Open transaction handed to the [`Driver::execute_tx`] callback.
///
/// Every statement issued inside the callback goes through this handle; the
/// concrete transaction type stays private to the adapter.
#[async_trait]
pub trait Transaction: Send {
    async fn exec(&mut self, stmt: &Statement) -> CoreResult<ExecResult>;

    async fn query(&mut self, stmt: &Statement) -> CoreResult<Vec<Row>>;

    async fn query_row(&mut self, stmt: &Statement) -> CoreResult<Option<Row>> {
        Ok(self.query(stmt).await?.into_iter().next())
    }
}

/// Callback run inside a transaction. Returning `Err` rolls back.
pub type TxFn<'a> = Box<
    dyn for<'t> FnOnce(&'t mut dyn Transaction) -> BoxFuture<'t, CoreResult<()>> + Send + 'a,
>;

/// Boxes a transaction callback.
///
/// The closure must own what it captures:
///
/// ```ignore
/// driver
///     .execute_tx(tx_fn(move |tx| {
///         Box::pin(async move {
///             tx.exec(&stmt).await?;
///             Ok(())
///         })
///     }))
///     .await?;
/// ```
pub fn tx_fn<'a, F>(f: F) -> TxFn<'a>
where
    F: for<'t> FnOnce(&'t mut dyn Transaction) -> BoxFuture<'t, CoreResult<()>> + Send + 'a,
{
    Box::new(f)
}

/// Capability interface every backend adapter implements.
///
/// All implementations must be thread-safe; one driver instance is shared by
/// every worker of a run.
#[async_trait]
pub trait Driver: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Opens the connection pool for `dsn`.
    async fn connect(&self, dsn: &str) -> CoreResult<()>;

    /// Closes the pool. Further calls fail with `CoreError::Connection`.
    async fn close(&self) -> CoreResult<()>;

    /// Drops all workload-owned state.
    async fn reset(&self) -> CoreResult<()>;

    /// Runs `f` between begin and commit; rolls back when `f` fails or when
    /// the commit itself fails.
    async fn execute_tx(&self, f: TxFn<'_>) -> CoreResult<()>;

    async fn exec(&self, stmt: &Statement) -> CoreResult<ExecResult>;

    async fn query(&self, stmt: &Statement) -> CoreResult<Vec<Row>>;

    async fn query_row(&self, stmt: &Statement) -> CoreResult<Option<Row>> {
        Ok(self.query(stmt).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("postgresql".parse::<BackendKind>().unwrap(), BackendKind::Postgres);
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("mongo".parse::<BackendKind>().is_err());
        assert!(BackendKind::Sqlite.is_sql());
        assert!(!BackendKind::Memory.is_sql());
    }
}
