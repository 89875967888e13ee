//! Logging initialization
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`. Output
//! goes to stderr so stdout carries only the run result.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info,dbbench=debug";

/// Builds the env filter, falling back to [`DEFAULT_FILTER`].
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the global subscriber.
///
/// Returns an error if a global subscriber was already installed.
pub fn init_logging() -> Result<(), tracing_subscriber::util::TryInitError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    Registry::default()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()
}
