use serde::{Deserialize, Serialize};

use crate::types::FileId;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Starts a new chunked upload.
///
/// `size` is signed so that a non-positive size reaches validation instead
/// of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitUploadRequest {
    pub name: String,
    pub size: i64,
    #[serde(default)]
    pub mime_type: String,
}

/// Seals an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteUploadRequest {
    #[serde(alias = "upload_id")]
    pub file_id: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Returned by a successful completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
}

impl CompleteUploadResponse {
    pub fn completed(file_id: FileId) -> Self {
        Self {
            status: "completed".into(),
            file_id: Some(file_id),
        }
    }
}

/// Body of the liveness and readiness endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
