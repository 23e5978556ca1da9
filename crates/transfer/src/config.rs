use std::time::Duration;

use chunkvault_protocol::constants::{MAX_CHUNK_SIZE, MAX_CHUNKS_PER_FILE};
use serde::{Deserialize, Serialize};

use crate::limiter::RateLimit;
use crate::retry::{RetryPolicy, duration_secs};

/// What to do when received bytes disagree with the recorded size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeMismatchPolicy {
    /// Log a warning and keep going.
    #[default]
    Warn,
    /// Fail the operation.
    Reject,
}

/// Tunables for both pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Largest accepted chunk, in bytes.
    pub max_chunk_size: u64,
    /// Largest chunk count a file may need.
    pub max_chunks_per_file: u32,
    /// Chunk size used when splitting whole payloads.
    pub upload_chunk_size: u64,
    /// Concurrent chunk uploads per whole-payload upload.
    pub upload_concurrency: usize,
    /// Concurrent chunk fetches per assembly.
    pub download_concurrency: usize,
    #[serde(with = "duration_secs")]
    pub metadata_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub upload_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub link_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub fetch_timeout: Duration,
    pub size_mismatch: SizeMismatchPolicy,
    /// Serialize uploads of the same file behind a per-file lock.
    pub exclusive_file_uploads: bool,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimit,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: MAX_CHUNK_SIZE,
            max_chunks_per_file: MAX_CHUNKS_PER_FILE,
            upload_chunk_size: MAX_CHUNK_SIZE,
            upload_concurrency: 4,
            download_concurrency: 15,
            metadata_timeout: Duration::from_secs(5),
            upload_timeout: Duration::from_secs(10 * 60),
            link_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(60),
            size_mismatch: SizeMismatchPolicy::Warn,
            exclusive_file_uploads: false,
            retry: RetryPolicy::default(),
            rate_limit: RateLimit::default(),
        }
    }
}
