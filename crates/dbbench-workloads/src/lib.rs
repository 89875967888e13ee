//! Benchmark scenarios for dbbench.
//!
//! Workloads are grouped into families; [`build`] resolves a
//! `(family, test)` pair for one backend. Each workload picks its query
//! provider once at construction, so attempts never branch on the backend.

pub mod analytics;
pub mod dialect;
pub mod ecommerce;
pub mod socialmedia;

mod support;

use std::sync::Arc;

use dbbench_core::{BackendKind, CoreError, CoreResult};
use dbbench_engine::Workload;

pub use dialect::Dialect;

/// Every `(family, tests)` the registry knows.
pub const CATALOG: &[(&str, &[&str])] = &[
    (
        "ecommerce",
        &["inventory_update", "order_processing", "catalog_filter"],
    ),
    ("socialmedia", &["fan_out_on_write", "join_on_read"]),
    ("analytics", &["ingestion", "dashboard_query"]),
];

/// Builds the workload named `test` in `family` with default sizing.
pub fn build(family: &str, test: &str, backend: BackendKind) -> CoreResult<Arc<dyn Workload>> {
    let workload: Arc<dyn Workload> = match (family, test) {
        ("ecommerce", "inventory_update") => Arc::new(ecommerce::InventoryUpdate::new(backend)),
        ("ecommerce", "order_processing") => Arc::new(ecommerce::OrderProcessing::new(backend)),
        ("ecommerce", "catalog_filter") => Arc::new(ecommerce::CatalogFilter::new(backend)),
        ("socialmedia", "fan_out_on_write") => {
            Arc::new(socialmedia::FanOutOnWrite::new(backend))
        }
        ("socialmedia", "join_on_read") => Arc::new(socialmedia::JoinOnRead::new(backend)),
        ("analytics", "ingestion") => Arc::new(analytics::Ingestion::new(backend)),
        ("analytics", "dashboard_query") => Arc::new(analytics::DashboardQuery::new(backend)),
        _ => return Err(unknown(family, test)),
    };
    Ok(workload)
}

fn unknown(family: &str, test: &str) -> CoreError {
    match CATALOG.iter().find(|(name, _)| *name == family) {
        Some((_, tests)) => CoreError::InvalidConfig(format!(
            "unknown test `{test}` for workload `{family}` (expected one of: {})",
            tests.join(", ")
        )),
        None => CoreError::InvalidConfig(format!(
            "unknown workload `{family}` (expected one of: {})",
            CATALOG
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_catalog_entry_builds() {
        for (family, tests) in CATALOG {
            for test in *tests {
                let workload = build(family, test, BackendKind::Memory).unwrap();
                assert_eq!(workload.name(), *test);
            }
        }
    }

    #[test]
    fn test_unknown_names_are_invalid_config() {
        let err = build("ecommerce", "checkout", BackendKind::Sqlite).err().unwrap();
        assert!(matches!(err, CoreError::InvalidConfig(ref m) if m.contains("inventory_update")));

        let err = build("banking", "transfer", BackendKind::Sqlite).err().unwrap();
        assert!(matches!(err, CoreError::InvalidConfig(ref m) if m.contains("socialmedia")));
    }
}
