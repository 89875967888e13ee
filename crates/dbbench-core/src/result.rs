//! The record a benchmark run produces.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why the run phase stopped issuing new attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// The configured duration elapsed.
    DeadlineReached,
    /// A worker observed the workload's designed end state.
    TerminalConditionMet,
}

impl StopCause {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineReached => "deadline_reached",
            Self::TerminalConditionMet => "terminal_condition_met",
        }
    }
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final statistics of one run. Durations serialize as integer microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Operations completed without error.
    pub operations: u64,
    /// Operations that failed and were counted. Transient retries are not.
    pub errors: u64,
    /// Operations per second of run-phase wall time.
    pub throughput: f64,
    /// `errors / (operations + errors)`, 0.0 when nothing was attempted.
    pub error_rate: f64,
    #[serde(with = "duration_micros")]
    pub p95_latency: Duration,
    #[serde(with = "duration_micros")]
    pub p99_latency: Duration,
    #[serde(with = "duration_micros")]
    pub average_latency: Duration,
    /// Wall-clock span of the run phase.
    #[serde(with = "duration_micros")]
    pub total_time: Duration,
    /// Result of the post-run integrity check.
    pub data_integrity: bool,
    /// Transient conflicts that were retried (informational).
    #[serde(default)]
    pub transient_retries: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_cause: Option<StopCause>,
    /// Workers that panicked. Their counts up to the panic are included.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub panicked_workers: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl RunResult {
    /// Attempts that produced a counted outcome.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.operations + self.errors
    }

    /// Renders the record as `key=value` lines in field order.
    #[must_use]
    pub fn to_key_values(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("operations", self.operations.to_string()),
            ("errors", self.errors.to_string()),
            ("throughput", format!("{:.2}", self.throughput)),
            ("error_rate", format!("{:.6}", self.error_rate)),
            ("p95_latency_us", self.p95_latency.as_micros().to_string()),
            ("p99_latency_us", self.p99_latency.as_micros().to_string()),
            ("average_latency_us", self.average_latency.as_micros().to_string()),
            ("total_time_us", self.total_time.as_micros().to_string()),
            ("data_integrity", self.data_integrity.to_string()),
            ("transient_retries", self.transient_retries.to_string()),
        ];
        if let Some(cause) = self.stop_cause {
            pairs.push(("stop_cause", cause.to_string()));
        }
        if self.panicked_workers > 0 {
            pairs.push(("panicked_workers", self.panicked_workers.to_string()));
        }
        pairs
    }
}

mod duration_micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        serializer.serialize_u64(micros)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunResult {
        RunResult {
            operations: 100,
            errors: 0,
            throughput: 50.0,
            error_rate: 0.0,
            p95_latency: Duration::from_micros(1_500),
            p99_latency: Duration::from_micros(2_000),
            average_latency: Duration::from_micros(900),
            total_time: Duration::from_secs(2),
            data_integrity: true,
            transient_retries: 7,
            stop_cause: Some(StopCause::TerminalConditionMet),
            panicked_workers: 0,
        }
    }

    #[test]
    fn serializes_as_flat_record() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["operations"], 100);
        assert_eq!(json["p95_latency"], 1_500);
        assert_eq!(json["total_time"], 2_000_000);
        assert_eq!(json["data_integrity"], true);
        assert_eq!(json["stop_cause"], "terminal_condition_met");
    }

    #[test]
    fn stop_cause_omitted_when_absent() {
        let mut result = sample();
        result.stop_cause = None;
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("stop_cause").is_none());
        assert!(json.get("panicked_workers").is_none());

        let back: RunResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn key_values_in_field_order() {
        let pairs = sample().to_key_values();
        assert_eq!(pairs[0], ("operations", "100".to_string()));
        assert_eq!(pairs.last().unwrap().0, "stop_cause");
    }

    #[test]
    fn panicked_workers_reported_when_present() {
        let mut result = sample();
        result.panicked_workers = 2;
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["panicked_workers"], 2);
        assert_eq!(
            result.to_key_values().last().unwrap(),
            &("panicked_workers", "2".to_string())
        );
    }
}
