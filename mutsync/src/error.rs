use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single mutation attempt or of a whole `mutate()` call.
///
/// Cloneable so the last terminal error can live in a state snapshot.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum MutationError {
    /// The server could not be reached (DNS, refused connection, reset).
    #[error("network error: {0}")]
    Network(String),
    /// The attempt was cancelled after exceeding its timeout.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// The server answered with a non-2xx status.
    #[error("http {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: Option<JsonValue>,
    },
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl MutationError {
    pub fn status(&self) -> Option<u16> {
        match self {
            MutationError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Default retry classification: transport failures, timeouts and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            MutationError::Network(_) | MutationError::Timeout(_) => true,
            MutationError::Http { status, .. } => *status >= 500,
            MutationError::InvalidEndpoint { .. } => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            MutationError::Timeout(timeout)
        } else {
            MutationError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("queue storage io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encode queue: {0}")]
    Encode(#[from] serde_json::Error),
}
