use thiserror::Error;

/// Canonical error type shared by drivers, workloads and the engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Could not establish (or lost) the connection to the backend.
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable connection failure.
        message: String,
    },

    /// Backend reported contention that is expected to resolve on retry
    /// (serialization failure, deadlock victim, database busy).
    #[error("transient conflict [{code}]: {message}")]
    Conflict {
        /// Backend error code (e.g. SQLSTATE `40001`).
        code: String,
        /// Backend message.
        message: String,
    },

    /// The contended resource reached its designed end state.
    #[error("{resource} exhausted")]
    Exhausted {
        /// Resource that ran out (e.g. `"inventory"`).
        resource: String,
    },

    /// Backend rejected an operation for a non-transient reason.
    #[error("backend error: {0}")]
    Backend(String),

    /// Expected row or document was absent.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"product"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// A value could not be converted to the requested type.
    #[error("decode error: {0}")]
    Decode(String),

    /// The driver does not speak this kind of statement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Invalid configuration or run parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Workload setup failed; no workers were started.
    #[error("setup failed: {source}")]
    SetupFailed {
        /// Underlying cause.
        #[source]
        source: Box<CoreError>,
    },

    /// Workload teardown failed.
    #[error("teardown failed: {source}")]
    TeardownFailed {
        /// Underlying cause.
        #[source]
        source: Box<CoreError>,
    },

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl CoreError {
    /// Creates a `Connection` variant.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a `Conflict` variant.
    #[must_use]
    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates an `Exhausted` variant.
    #[must_use]
    pub fn exhausted(resource: impl Into<String>) -> Self {
        Self::Exhausted {
            resource: resource.into(),
        }
    }

    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wraps an error raised while preparing the fixture.
    #[must_use]
    pub fn setup_failed(source: CoreError) -> Self {
        Self::SetupFailed {
            source: Box::new(source),
        }
    }

    /// Wraps an error raised while removing the fixture.
    #[must_use]
    pub fn teardown_failed(source: CoreError) -> Self {
        Self::TeardownFailed {
            source: Box::new(source),
        }
    }

    /// Returns true when retrying the same operation is expected to succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true for the designed terminal condition.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() || err.is_data() {
            Self::Decode(err.to_string())
        } else {
            Self::SerializationError(err.to_string())
        }
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Convenient result alias for benchmark operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_transient_and_exhausted_is_not() {
        assert!(CoreError::conflict("40001", "could not serialize").is_transient());
        assert!(!CoreError::exhausted("inventory").is_transient());
        assert!(CoreError::exhausted("inventory").is_exhausted());
        assert!(!CoreError::Backend("syntax error".into()).is_transient());
    }

    #[test]
    fn setup_failure_keeps_source_message() {
        let err = CoreError::setup_failed(CoreError::Backend("table exists".into()));
        assert_eq!(err.to_string(), "setup failed: backend error: table exists");
    }
}
