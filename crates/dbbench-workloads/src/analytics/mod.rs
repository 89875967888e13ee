//! Event-stream scenarios over a single `analytics_events` table.

pub mod dashboard_query;
pub mod ingestion;
pub mod queries;

pub use dashboard_query::DashboardQuery;
pub use ingestion::Ingestion;
pub use queries::{AnalyticsQueries, DocumentAnalytics, Event, SqlAnalytics};
