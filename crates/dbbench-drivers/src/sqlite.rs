//! SQLite adapter over `sqlx`.
//!
//! Opens databases in WAL mode with a busy timeout so concurrent writers
//! queue instead of failing immediately; whatever contention is left
//! surfaces as SQLITE_BUSY and is reported as a transient conflict.
//!
//! Text arrays and JSON parameters are stored as JSON text, timestamps as
//! fixed-width RFC 3339 strings in UTC so they compare lexically.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use dbbench_core::{
    BackendKind, CoreError, CoreResult, Driver, ExecResult, Row, Statement, Transaction, TxFn,
    Value,
};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Column, Row as _, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::sql::{expect_sql, map_sqlx_error, not_connected};

const BACKEND: BackendKind = BackendKind::Sqlite;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Pool settings for [`SqliteDriver`].
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// [`Driver`] backed by a SQLite connection pool.
#[derive(Debug, Default)]
pub struct SqliteDriver {
    options: SqliteOptions,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(options: SqliteOptions) -> Self {
        Self {
            options,
            pool: RwLock::new(None),
        }
    }

    fn pool(&self) -> CoreResult<SqlitePool> {
        self.pool.read().clone().ok_or_else(|| not_connected(BACKEND))
    }
}

/// Creates a SQLite pool for benchmark traffic.
pub async fn create_sqlite_pool(
    database_url: &str,
    options: &SqliteOptions,
) -> Result<SqlitePool, sqlx::Error> {
    let connect = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(options.busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(connect)
        .await
}

fn bind_params<'q>(mut query: SqliteQuery<'q>, params: &[Value]) -> SqliteQuery<'q> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
            Value::Timestamp(ts) => query.bind(ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Value::TextArray(items) => query.bind(JsonValue::from(items.clone()).to_string()),
            Value::Json(json) => query.bind(json.to_string()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> CoreResult<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, index)?);
    }
    Ok(Row::new(columns, values))
}

fn decode_value(row: &SqliteRow, index: usize) -> CoreResult<Value> {
    let map = |e| map_sqlx_error(BACKEND, e);
    let raw = row.try_get_raw(index).map_err(map)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let value = match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" => {
            Value::Int(row.try_get_unchecked::<i64, _>(index).map_err(map)?)
        }
        "BOOLEAN" => Value::Bool(row.try_get_unchecked::<bool, _>(index).map_err(map)?),
        "REAL" | "DOUBLE" | "FLOAT" | "NUMERIC" => {
            Value::Float(row.try_get_unchecked::<f64, _>(index).map_err(map)?)
        }
        "TEXT" | "DATETIME" | "DATE" | "TIME" => {
            Value::Text(row.try_get_unchecked::<String, _>(index).map_err(map)?)
        }
        other => {
            return Err(CoreError::Decode(format!(
                "unsupported SQLite column type `{other}` at index {index}"
            )))
        }
    };
    Ok(value)
}

fn decode_rows(rows: &[SqliteRow]) -> CoreResult<Vec<Row>> {
    rows.iter().map(decode_row).collect()
}

struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn exec(&mut self, stmt: &Statement) -> CoreResult<ExecResult> {
        let sql = expect_sql(BACKEND, stmt)?;
        let result = bind_params(sqlx::query(&sql.text), &sql.params)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(BACKEND, e))?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
        })
    }

    async fn query(&mut self, stmt: &Statement) -> CoreResult<Vec<Row>> {
        let sql = expect_sql(BACKEND, stmt)?;
        let rows = bind_params(sqlx::query(&sql.text), &sql.params)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(BACKEND, e))?;
        decode_rows(&rows)
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn backend(&self) -> BackendKind {
        BACKEND
    }

    async fn connect(&self, dsn: &str) -> CoreResult<()> {
        let pool = create_sqlite_pool(dsn, &self.options)
            .await
            .map_err(|e| match map_sqlx_error(BACKEND, e) {
                CoreError::Backend(message) => CoreError::connection(message),
                other => other,
            })?;
        info!(dsn, max_connections = self.options.max_connections, "SQLite pool opened");
        *self.pool.write() = Some(pool);
        Ok(())
    }

    async fn close(&self) -> CoreResult<()> {
        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            pool.close().await;
            debug!("SQLite pool closed");
        }
        Ok(())
    }

    async fn reset(&self) -> CoreResult<()> {
        let pool = self.pool()?;
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| map_sqlx_error(BACKEND, e))?;

        for table in tables {
            sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\""))
                .execute(&pool)
                .await
                .map_err(|e| map_sqlx_error(BACKEND, e))?;
        }
        Ok(())
    }

    async fn execute_tx(&self, f: TxFn<'_>) -> CoreResult<()> {
        let pool = self.pool()?;
        let tx = pool.begin().await.map_err(|e| map_sqlx_error(BACKEND, e))?;
        let mut handle = SqliteTransaction { tx };

        match f(&mut handle).await {
            Ok(()) => handle
                .tx
                .commit()
                .await
                .map_err(|e| map_sqlx_error(BACKEND, e)),
            Err(err) => {
                if let Err(rollback) = handle.tx.rollback().await {
                    warn!(error = %rollback, "SQLite rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn exec(&self, stmt: &Statement) -> CoreResult<ExecResult> {
        let sql = expect_sql(BACKEND, stmt)?;
        let pool = self.pool()?;
        let result = bind_params(sqlx::query(&sql.text), &sql.params)
            .execute(&pool)
            .await
            .map_err(|e| map_sqlx_error(BACKEND, e))?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
        })
    }

    async fn query(&self, stmt: &Statement) -> CoreResult<Vec<Row>> {
        let sql = expect_sql(BACKEND, stmt)?;
        let pool = self.pool()?;
        let rows = bind_params(sqlx::query(&sql.text), &sql.params)
            .fetch_all(&pool)
            .await
            .map_err(|e| map_sqlx_error(BACKEND, e))?;
        decode_rows(&rows)
    }
}
