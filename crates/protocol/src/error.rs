use serde::{Deserialize, Serialize};

/// Coarse classification carried by every chunkvault error.
///
/// Retry decisions and HTTP status mapping dispatch on this value, never on
/// error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected input: bad id, bad size, chunk too large, too many chunks.
    Validation,
    /// Timeout, throttling, connection reset. Safe to retry.
    Transient,
    /// Backend refused the request for a reason retrying will not fix.
    Permanent,
    /// Unknown file id.
    NotFound,
    /// The operation conflicts with the file's lifecycle state.
    Conflict,
    /// No backend account is available.
    PoolExhausted,
    /// Local failure (I/O, corrupted state).
    Internal,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        self == ErrorKind::Transient
    }
}
