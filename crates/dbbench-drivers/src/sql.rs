//! Pieces shared by the `sqlx` adapters.

use dbbench_core::{BackendKind, CoreError, CoreResult, SqlStatement, Statement};
use tracing::debug;

/// SQLSTATE codes PostgreSQL reports for retryable conflicts.
const PG_TRANSIENT: &[&str] = &["40001", "40P01"];

/// SQLite primary and extended result codes for lock contention:
/// BUSY, LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE, BUSY_SNAPSHOT.
const SQLITE_TRANSIENT: &[&str] = &["5", "6", "261", "262", "517"];

/// Error mapping for both adapters. Lock and serialization failures become
/// [`CoreError::Conflict`] so the engine retries them silently.
pub(crate) fn map_sqlx_error(backend: BackendKind, err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            let transient = match backend {
                BackendKind::Postgres => PG_TRANSIENT.contains(&code.as_str()),
                BackendKind::Sqlite => SQLITE_TRANSIENT.contains(&code.as_str()),
                BackendKind::Memory => false,
            };
            if transient {
                CoreError::conflict(code, db_err.message().to_string())
            } else if code.is_empty() {
                CoreError::Backend(db_err.message().to_string())
            } else {
                CoreError::Backend(format!("{} (code {code})", db_err.message()))
            }
        }
        sqlx::Error::PoolTimedOut => {
            CoreError::connection("timed out acquiring a pooled connection")
        }
        sqlx::Error::PoolClosed => CoreError::connection("connection pool is closed"),
        sqlx::Error::Io(e) => CoreError::connection(e.to_string()),
        sqlx::Error::Tls(e) => CoreError::connection(e.to_string()),
        sqlx::Error::Configuration(e) => CoreError::InvalidConfig(e.to_string()),
        sqlx::Error::RowNotFound => CoreError::not_found("row", "query"),
        e @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
            CoreError::Decode(e.to_string())
        }
        other => CoreError::Backend(other.to_string()),
    }
}

/// Unwraps the SQL statement or rejects a document command.
pub(crate) fn expect_sql(backend: BackendKind, stmt: &Statement) -> CoreResult<&SqlStatement> {
    match stmt {
        Statement::Sql(sql) => Ok(sql),
        Statement::Document(cmd) => {
            debug!(%backend, command = cmd.verb(), "Rejected document command");
            Err(CoreError::Unsupported(format!(
                "{backend} driver does not execute document commands"
            )))
        }
    }
}

pub(crate) fn not_connected(backend: BackendKind) -> CoreError {
    CoreError::connection(format!("{backend} driver is not connected"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbbench_core::{DocumentCommand, Filter};

    #[test]
    fn test_pool_errors_are_connection_errors() {
        let err = map_sqlx_error(BackendKind::Postgres, sqlx::Error::PoolTimedOut);
        assert!(matches!(err, CoreError::Connection { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_document_commands_rejected() {
        let stmt: Statement = DocumentCommand::Count {
            collection: "orders".into(),
            filter: Filter::all(),
        }
        .into();
        let err = expect_sql(BackendKind::Sqlite, &stmt).unwrap_err();
        assert!(matches!(err, CoreError::Unsupported(_)));
        assert!(expect_sql(BackendKind::Sqlite, &Statement::sql("SELECT 1")).is_ok());
    }
}
