//! Records and request payloads shared across chunkvault.
//!
//! A logical file is a [`FileRecord`] holding an append-only list of
//! [`ChunkRecord`]s. Each chunk is an independent blob stored on the bot
//! backend; the record is the authoritative map from sequence number to
//! remote blob.

pub mod constants;
pub mod error;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use error::ErrorKind;
pub use messages::{
    CompleteUploadRequest, CompleteUploadResponse, ErrorResponse, HealthResponse,
    InitUploadRequest,
};
pub use types::{ChunkRecord, FileId, FileRecord, FileStatus, InvalidFileId, expected_chunks};
