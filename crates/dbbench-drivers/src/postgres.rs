//! PostgreSQL adapter over `sqlx`.
//!
//! Serialization failures (40001) and deadlocks (40P01) are reported as
//! transient conflicts. `NUMERIC` results are not decoded; queries cast
//! aggregates to `BIGINT` or `DOUBLE PRECISION`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use dbbench_core::{
    BackendKind, CoreError, CoreResult, Driver, ExecResult, Row, Statement, Transaction, TxFn,
    Value,
};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sql::{expect_sql, map_sqlx_error, not_connected};

const BACKEND: BackendKind = BackendKind::Postgres;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Pool settings for [`PostgresDriver`].
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 32,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// [`Driver`] backed by a PostgreSQL connection pool.
#[derive(Debug, Default)]
pub struct PostgresDriver {
    options: PostgresOptions,
    pool: RwLock<Option<PgPool>>,
}

impl PostgresDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(options: PostgresOptions) -> Self {
        Self {
            options,
            pool: RwLock::new(None),
        }
    }

    fn pool(&self) -> CoreResult<PgPool> {
        self.pool.read().clone().ok_or_else(|| not_connected(BACKEND))
    }
}

fn bind_params<'q>(mut query: PgQuery<'q>, params: &[Value]) -> PgQuery<'q> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
            Value::Timestamp(ts) => query.bind(*ts),
            Value::TextArray(items) => query.bind(items.clone()),
            Value::Json(json) => query.bind(json.clone()),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> CoreResult<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, index)?);
    }
    Ok(Row::new(columns, values))
}

fn decode_value(row: &PgRow, index: usize) -> CoreResult<Value> {
    let map = |e| map_sqlx_error(BACKEND, e);
    let raw = row.try_get_raw(index).map_err(map)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();
    let value = match type_name.as_str() {
        "INT2" => Value::Int(i64::from(row.try_get::<i16, _>(index).map_err(map)?)),
        "INT4" => Value::Int(i64::from(row.try_get::<i32, _>(index).map_err(map)?)),
        "INT8" => Value::Int(row.try_get::<i64, _>(index).map_err(map)?),
        "FLOAT4" => Value::Float(f64::from(row.try_get::<f32, _>(index).map_err(map)?)),
        "FLOAT8" => Value::Float(row.try_get::<f64, _>(index).map_err(map)?),
        "BOOL" => Value::Bool(row.try_get::<bool, _>(index).map_err(map)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            Value::Text(row.try_get::<String, _>(index).map_err(map)?)
        }
        "TIMESTAMPTZ" => Value::Timestamp(row.try_get::<DateTime<Utc>, _>(index).map_err(map)?),
        "TIMESTAMP" => Value::Timestamp(
            row.try_get::<NaiveDateTime, _>(index)
                .map_err(map)?
                .and_utc(),
        ),
        "TEXT[]" | "VARCHAR[]" => {
            Value::TextArray(row.try_get::<Vec<String>, _>(index).map_err(map)?)
        }
        "JSON" | "JSONB" => Value::Json(row.try_get::<JsonValue, _>(index).map_err(map)?),
        "UUID" => Value::Text(row.try_get::<Uuid, _>(index).map_err(map)?.to_string()),
        other => {
            return Err(CoreError::Decode(format!(
                "unsupported PostgreSQL column type `{other}` at index {index}; cast it in the query"
            )))
        }
    };
    Ok(value)
}

fn decode_rows(rows: &[PgRow]) -> CoreResult<Vec<Row>> {
    rows.iter().map(decode_row).collect()
}

struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
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
impl Driver for PostgresDriver {
    fn backend(&self) -> BackendKind {
        BACKEND
    }

    async fn connect(&self, dsn: &str) -> CoreResult<()> {
        let pool = PgPoolOptions::new()
            .max_connections(self.options.max_connections)
            .acquire_timeout(self.options.acquire_timeout)
            .connect(dsn)
            .await
            .map_err(|e| match map_sqlx_error(BACKEND, e) {
                CoreError::Backend(message) => CoreError::connection(message),
                other => other,
            })?;
        info!(max_connections = self.options.max_connections, "PostgreSQL pool opened");
        *self.pool.write() = Some(pool);
        Ok(())
    }

    async fn close(&self) -> CoreResult<()> {
        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            pool.close().await;
            debug!("PostgreSQL pool closed");
        }
        Ok(())
    }

    async fn reset(&self) -> CoreResult<()> {
        let pool = self.pool()?;
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT tablename::TEXT FROM pg_tables WHERE schemaname = current_schema()",
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| map_sqlx_error(BACKEND, e))?;

        for table in tables {
            sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\" CASCADE"))
                .execute(&pool)
                .await
                .map_err(|e| map_sqlx_error(BACKEND, e))?;
        }
        Ok(())
    }

    async fn execute_tx(&self, f: TxFn<'_>) -> CoreResult<()> {
        let pool = self.pool()?;
        let tx = pool.begin().await.map_err(|e| map_sqlx_error(BACKEND, e))?;
        let mut handle = PgTransaction { tx };

        match f(&mut handle).await {
            Ok(()) => handle
                .tx
                .commit()
                .await
                .map_err(|e| map_sqlx_error(BACKEND, e)),
            Err(err) => {
                if let Err(rollback) = handle.tx.rollback().await {
                    warn!(error = %rollback, "PostgreSQL rollback failed");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_connected() {
        let driver = PostgresDriver::new();
        assert_eq!(driver.backend(), BackendKind::Postgres);
        let err = driver.query(&Statement::sql("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, CoreError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_rejects_malformed_dsn() {
        let driver = PostgresDriver::new();
        let err = driver.connect("not a url").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Connection { .. } | CoreError::InvalidConfig(_)
        ));
    }
}
