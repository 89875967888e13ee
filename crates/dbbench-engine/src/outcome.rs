//! Attempt outcomes and the default failure classification.

use std::time::Duration;

use dbbench_core::{CoreError, RetryConfig};

/// Classified result of one backend attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptStatus {
    /// The operation committed.
    Success,
    /// The operation failed and counts toward `errors`.
    CountedError,
    /// Contention expected to clear on retry; never counted.
    TransientRetry,
    /// The workload reached its designed end state; the run stops.
    TerminalStop,
}

impl AttemptStatus {
    /// Classifies an attempt result with the default policy.
    #[must_use]
    pub fn from_result<T>(result: &Result<T, CoreError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => classify(err),
        }
    }

    /// True for outcomes that contribute to `operations + errors`.
    #[must_use]
    pub fn is_counted(&self) -> bool {
        matches!(self, Self::Success | Self::CountedError)
    }
}

/// One finished logical attempt as seen by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// Time from the first try to the final status, retries included.
    pub latency: Duration,
    pub status: AttemptStatus,
}

/// Default classification: conflicts retry, exhaustion stops, everything
/// else is a counted error.
#[must_use]
pub fn classify(err: &CoreError) -> AttemptStatus {
    match err {
        CoreError::Conflict { .. } => AttemptStatus::TransientRetry,
        CoreError::Exhausted { .. } => AttemptStatus::TerminalStop,
        _ => AttemptStatus::CountedError,
    }
}

/// How a worker treats [`AttemptStatus::TransientRetry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Retries allowed per logical attempt; `None` means unbounded.
    pub max_retries: Option<u32>,
    /// Fixed pause before each retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Retries until the attempt stops conflicting or the run stops.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
            backoff: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether another retry is allowed after `retries_done` retries.
    #[must_use]
    pub fn allows(&self, retries_done: u32) -> bool {
        self.max_retries.map_or(true, |max| retries_done < max)
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.backoff,
        }
    }
}
