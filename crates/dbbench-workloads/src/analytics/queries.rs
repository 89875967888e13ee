//! Statements behind the analytics workloads.

use chrono::{DateTime, Utc};
use dbbench_core::{BackendKind, DocumentCommand, Filter, SqlStatement, Statement};
use serde_json::json;

use crate::dialect::Dialect;
use crate::support::document_timestamp;

pub const EVENTS: &str = "analytics_events";

/// One metric sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub product_id: String,
    pub region: String,
    pub metric_value: f64,
}

impl Event {
    /// Synthetic event number `i`: users cycle over 1000 ids, products over
    /// 100 and regions over 10.
    #[must_use]
    pub fn synthetic(id: String, i: usize, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            timestamp,
            user_id: format!("user{}", i % 1000),
            product_id: format!("product{}", i % 100),
            region: format!("region{}", i % 10),
            metric_value: i as f64,
        }
    }
}

pub trait AnalyticsQueries: Send + Sync {
    /// Events table plus its timestamp index.
    fn create_schema(&self) -> Vec<Statement>;

    fn drop_schema(&self) -> Vec<Statement>;

    fn insert_event(&self, event: &Event) -> Statement;

    /// Single row whose `count` column holds the number of stored events.
    fn count_events(&self) -> Statement;

    /// Per-region sum of `metric_value` over events newer than `cutoff`.
    fn regional_totals(&self, cutoff: DateTime<Utc>) -> Statement;
}

#[must_use]
pub fn for_backend(backend: BackendKind) -> Box<dyn AnalyticsQueries> {
    match Dialect::for_backend(backend) {
        Some(dialect) => Box::new(SqlAnalytics::new(dialect)),
        None => Box::new(DocumentAnalytics),
    }
}

#[derive(Debug, Clone)]
pub struct SqlAnalytics {
    dialect: Dialect,
    insert: String,
    totals: String,
}

impl SqlAnalytics {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            insert: dialect.render(
                "INSERT INTO analytics_events \
                 (event_id, event_timestamp, user_id, product_id, region, metric_value) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            ),
            totals: dialect.render(
                "SELECT region, SUM(metric_value) AS total FROM analytics_events \
                 WHERE event_timestamp > $1 GROUP BY region",
            ),
        }
    }
}

impl AnalyticsQueries for SqlAnalytics {
    fn create_schema(&self) -> Vec<Statement> {
        let ts = self.dialect.timestamp_type();
        let double = self.dialect.double_type();
        vec![
            Statement::sql(format!(
                "CREATE TABLE IF NOT EXISTS analytics_events (
                    event_id VARCHAR(255) PRIMARY KEY,
                    event_timestamp {ts} NOT NULL,
                    user_id VARCHAR(255) NOT NULL,
                    product_id VARCHAR(255) NOT NULL,
                    region VARCHAR(255) NOT NULL,
                    metric_value {double} NOT NULL
                )"
            )),
            Statement::sql(
                "CREATE INDEX IF NOT EXISTS idx_event_timestamp \
                 ON analytics_events (event_timestamp)",
            ),
        ]
    }

    fn drop_schema(&self) -> Vec<Statement> {
        vec![Statement::sql(format!(
            "DROP TABLE IF EXISTS {EVENTS}{}",
            self.dialect.drop_suffix()
        ))]
    }

    fn insert_event(&self, event: &Event) -> Statement {
        SqlStatement::new(self.insert.clone())
            .bind(event.id.as_str())
            .bind(event.timestamp)
            .bind(event.user_id.as_str())
            .bind(event.product_id.as_str())
            .bind(event.region.as_str())
            .bind(event.metric_value)
            .into()
    }

    fn count_events(&self) -> Statement {
        Statement::sql("SELECT COUNT(*) AS count FROM analytics_events")
    }

    fn regional_totals(&self, cutoff: DateTime<Utc>) -> Statement {
        SqlStatement::new(self.totals.clone()).bind(cutoff).into()
    }
}

/// Commands for the document store; timestamps are stored as sortable text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentAnalytics;

impl AnalyticsQueries for DocumentAnalytics {
    fn create_schema(&self) -> Vec<Statement> {
        Vec::new()
    }

    fn drop_schema(&self) -> Vec<Statement> {
        vec![DocumentCommand::DropCollection {
            collection: EVENTS.into(),
        }
        .into()]
    }

    fn insert_event(&self, event: &Event) -> Statement {
        DocumentCommand::InsertOne {
            collection: EVENTS.into(),
            document: json!({
                "_id": event.id,
                "event_timestamp": document_timestamp(event.timestamp),
                "user_id": event.user_id,
                "product_id": event.product_id,
                "region": event.region,
                "metric_value": event.metric_value,
            }),
        }
        .into()
    }

    fn count_events(&self) -> Statement {
        DocumentCommand::Count {
            collection: EVENTS.into(),
            filter: Filter::all(),
        }
        .into()
    }

    fn regional_totals(&self, cutoff: DateTime<Utc>) -> Statement {
        DocumentCommand::GroupSum {
            collection: EVENTS.into(),
            filter: Filter::all().gt("event_timestamp", document_timestamp(cutoff)),
            group_by: "region".into(),
            sum_field: "metric_value".into(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_event_cycles() {
        let event = Event::synthetic("e".into(), 1234, Utc::now());
        assert_eq!(event.user_id, "user234");
        assert_eq!(event.product_id, "product34");
        assert_eq!(event.region, "region4");
        assert_eq!(event.metric_value, 1234.0);
    }

    #[test]
    fn test_sqlite_insert_binds_six_params() {
        let queries = SqlAnalytics::new(Dialect::Sqlite);
        let event = Event::synthetic("e1".into(), 0, Utc::now());
        let Statement::Sql(sql) = queries.insert_event(&event) else {
            panic!("expected SQL");
        };
        assert!(sql.text.ends_with("VALUES (?1, ?2, ?3, ?4, ?5, ?6)"));
        assert_eq!(sql.params.len(), 6);
    }

    #[test]
    fn test_document_totals_filter_on_timestamp() {
        let Statement::Document(DocumentCommand::GroupSum {
            filter, group_by, ..
        }) = DocumentAnalytics.regional_totals(Utc::now())
        else {
            panic!("expected a group-sum command");
        };
        assert_eq!(group_by, "region");
        assert_eq!(filter.clauses.len(), 1);
    }
}
