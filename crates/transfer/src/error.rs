use std::future::Future;
use std::time::Duration;

use chunkvault_bot_pool::BackendError;
use chunkvault_metadata::StoreError;
use chunkvault_protocol::{ErrorKind, FileId};

/// Errors produced by the transfer pipelines.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("file not found: {0}")]
    NotFound(FileId),

    #[error("file upload not completed: {0}")]
    NotCompleted(FileId),

    #[error("file {0} is already completed")]
    AlreadyCompleted(FileId),

    #[error("no bots available")]
    PoolExhausted,

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("metadata error: {0}")]
    Store(#[from] StoreError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("size mismatch{}: expected {expected} bytes, got {actual}", chunk_label(.sequence))]
    SizeMismatch {
        sequence: Option<u32>,
        expected: u64,
        actual: u64,
    },

    #[error("failed chunk {sequence}: {source}")]
    ChunkFailed {
        sequence: u32,
        #[source]
        source: Box<TransferError>,
    },

    #[error("corrupted record for {file_id}: {reason}")]
    Corrupted { file_id: FileId, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn chunk_label(sequence: &Option<u32>) -> String {
    sequence.map(|s| format!(" in chunk {s}")).unwrap_or_default()
}

impl TransferError {
    /// Classifies the failure. Retry and HTTP status mapping use this.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Validation(_) => ErrorKind::Validation,
            TransferError::NotFound(_) => ErrorKind::NotFound,
            TransferError::NotCompleted(_) | TransferError::AlreadyCompleted(_) => {
                ErrorKind::Conflict
            }
            TransferError::PoolExhausted => ErrorKind::PoolExhausted,
            TransferError::Backend(e) => e.kind(),
            TransferError::Store(e) => e.kind(),
            TransferError::Timeout { .. } => ErrorKind::Transient,
            TransferError::ChunkFailed { source, .. } => source.kind(),
            TransferError::SizeMismatch { .. }
            | TransferError::Corrupted { .. }
            | TransferError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Minimum wait requested by the backend before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransferError::Backend(e) => e.retry_after(),
            TransferError::ChunkFailed { source, .. } => source.retry_after(),
            _ => None,
        }
    }
}

/// Runs `fut` with a deadline, mapping expiry to [`TransferError::Timeout`].
pub(crate) async fn deadline<T, E>(
    operation: &'static str,
    after: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, TransferError>
where
    E: Into<TransferError>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(TransferError::Timeout { operation, after }),
    }
}
