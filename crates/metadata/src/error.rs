use chunkvault_protocol::{ErrorKind, FileId};

/// Errors from metadata store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(FileId),

    #[error("file already exists: {0}")]
    AlreadyExists(FileId),

    #[error("file {0} is already completed")]
    NotPending(FileId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) | StoreError::NotPending(_) => ErrorKind::Conflict,
            StoreError::Io(_) | StoreError::Json(_) => ErrorKind::Internal,
        }
    }
}
