//! Backend error types and their classification.

use std::time::Duration;

use chunkvault_protocol::ErrorKind;

/// Errors from a single bot account call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("API error {status}: {description}")]
    Api { status: u16, description: String },

    #[error("throttled by backend: {description}")]
    Throttled {
        retry_after: Option<Duration>,
        description: String,
    },

    #[error("request timed out")]
    Timeout,

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return BackendError::Timeout;
        }
        // Request URLs embed the bot token.
        BackendError::Http(e.without_url())
    }
}

impl BackendError {
    /// Classifies the failure for retry and status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Throttled { .. } | BackendError::Timeout => ErrorKind::Transient,
            BackendError::Api { status, .. } => status_kind(*status),
            BackendError::Http(e) => match e.status() {
                Some(status) => status_kind(status.as_u16()),
                None if e.is_builder() => ErrorKind::Permanent,
                // Connect failures, resets and truncated bodies.
                None => ErrorKind::Transient,
            },
            BackendError::Protocol(_) | BackendError::Json(_) => ErrorKind::Permanent,
        }
    }

    /// Wait time the backend asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BackendError::Throttled { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn status_kind(status: u16) -> ErrorKind {
    match status {
        429 | 500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

/// Errors from building an account pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no bot credentials configured")]
    NoAccounts,

    #[error("bot account #{index} failed validation: {source}")]
    Account {
        index: usize,
        #[source]
        source: BackendError,
    },

    #[error("HTTP client error: {0}")]
    Client(#[source] BackendError),
}
