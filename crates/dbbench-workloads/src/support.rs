//! Helpers shared by the workloads.

use chrono::{DateTime, SecondsFormat, Utc};
use dbbench_core::{tx_fn, CoreResult, Driver, Statement};
use serde_json::Value as JsonValue;

/// Runs `statements` in order inside one transaction.
pub(crate) async fn exec_in_tx(driver: &dyn Driver, statements: Vec<Statement>) -> CoreResult<()> {
    if statements.is_empty() {
        return Ok(());
    }
    driver
        .execute_tx(tx_fn(move |tx| {
            Box::pin(async move {
                for stmt in &statements {
                    tx.exec(stmt).await?;
                }
                Ok(())
            })
        }))
        .await
}

/// Timestamps as stored in documents: fixed-width RFC 3339, UTC, so string
/// comparison orders them.
pub(crate) fn document_timestamp(ts: DateTime<Utc>) -> JsonValue {
    JsonValue::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Random index in `0..bound`.
pub(crate) fn pick(bound: usize) -> usize {
    use rand::Rng;
    rand::thread_rng().gen_range(0..bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_document_timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1500);
        let (a, b) = (document_timestamp(early), document_timestamp(late));
        assert!(a.as_str().unwrap() < b.as_str().unwrap());
        assert_eq!(a, JsonValue::from("2024-01-01T09:00:00.000000Z"));
    }
}
