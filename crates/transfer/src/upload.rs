//! Upload side: init, idempotent chunk upload with retry, completion.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chunkvault_bot_pool::AccountPool;
use chunkvault_metadata::MetadataStore;
use chunkvault_protocol::constants::{chunk_blob_name, chunk_caption};
use chunkvault_protocol::{ChunkRecord, FileId, FileRecord, expected_chunks};
use futures_util::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info, warn};

use crate::chunked::ChunkSplitter;
use crate::config::{SizeMismatchPolicy, TransferConfig};
use crate::error::{TransferError, deadline};
use crate::locks::UploadLocks;
use crate::validation::{validate_chunk, validate_complete, validate_init};

/// Drives the init -> chunks -> complete upload lifecycle.
pub struct UploadPipeline {
    pool: Arc<AccountPool>,
    store: Arc<dyn MetadataStore>,
    config: Arc<TransferConfig>,
    locks: UploadLocks,
}

impl UploadPipeline {
    pub fn new(
        pool: Arc<AccountPool>,
        store: Arc<dyn MetadataStore>,
        config: Arc<TransferConfig>,
    ) -> Self {
        Self {
            pool,
            store,
            config,
            locks: UploadLocks::default(),
        }
    }

    /// Creates a pending record for a file of `size` bytes.
    pub async fn init_upload(
        &self,
        name: &str,
        size: i64,
        mime_type: &str,
    ) -> Result<FileRecord, TransferError> {
        let size = validate_init(&self.config, name, size)?;
        let record = FileRecord::new_pending(name, size, mime_type);

        deadline(
            "metadata insert",
            self.config.metadata_timeout,
            self.store.insert(record.clone()),
        )
        .await?;

        info!(
            file_id = %record.id,
            name,
            size,
            expected_chunks = expected_chunks(size, self.config.max_chunk_size),
            "upload initialized"
        );
        Ok(record)
    }

    /// Uploads one chunk, retrying transient failures.
    ///
    /// A sequence that is already recorded is returned as-is without
    /// contacting the backend.
    pub async fn upload_chunk(
        &self,
        file_id: FileId,
        sequence: u32,
        data: Bytes,
        destination: i64,
    ) -> Result<ChunkRecord, TransferError> {
        validate_chunk(&self.config, sequence, data.len())?;

        let _guard = if self.config.exclusive_file_uploads {
            Some(self.locks.lock(file_id).await)
        } else {
            None
        };

        self.config
            .retry
            .run("chunk upload", |_| {
                self.upload_chunk_once(file_id, sequence, data.clone(), destination)
            })
            .await
    }

    async fn upload_chunk_once(
        &self,
        file_id: FileId,
        sequence: u32,
        data: Bytes,
        destination: i64,
    ) -> Result<ChunkRecord, TransferError> {
        let started = Instant::now();
        let timeout = self.config.metadata_timeout;

        let existing = deadline(
            "chunk lookup",
            timeout,
            self.store.find_chunk(file_id, sequence),
        )
        .await?;
        if let Some(chunk) = existing {
            debug!(file_id = %file_id, sequence, "chunk already uploaded");
            return Ok(chunk);
        }

        let record = deadline("metadata lookup", timeout, self.store.get(file_id)).await?;
        if record.is_completed() {
            return Err(TransferError::AlreadyCompleted(file_id));
        }

        let account = self.pool.select_next().ok_or(TransferError::PoolExhausted)?;
        let name = chunk_blob_name(&file_id, sequence);
        let caption = chunk_caption(&file_id, sequence);
        let size = data.len() as u64;

        let sent = deadline(
            "chunk upload",
            self.config.upload_timeout,
            account.send_blob(destination, &name, data, &caption),
        )
        .await?;

        let chunk = ChunkRecord {
            sequence,
            message_id: sent.message_id,
            blob_id: sent.blob_id,
            owner: account.identity().to_string(),
            size,
        };
        deadline(
            "chunk append",
            timeout,
            self.store.append_chunk(file_id, chunk.clone()),
        )
        .await?;

        info!(
            file_id = %file_id,
            sequence,
            size,
            owner = %chunk.owner,
            message_id = chunk.message_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chunk uploaded"
        );
        Ok(chunk)
    }

    /// Seals the upload. Completing a completed upload succeeds.
    pub async fn complete_upload(&self, file_id: FileId) -> Result<FileRecord, TransferError> {
        let timeout = self.config.metadata_timeout;
        let record = deadline("metadata lookup", timeout, self.store.get(file_id)).await?;

        if record.is_completed() {
            self.locks.release(file_id);
            debug!(file_id = %file_id, "upload already completed");
            return Ok(record);
        }

        validate_complete(&record)?;
        let uploaded = record.uploaded_bytes();
        if uploaded != record.size {
            match self.config.size_mismatch {
                SizeMismatchPolicy::Warn => warn!(
                    file_id = %file_id,
                    declared = record.size,
                    uploaded,
                    "uploaded size differs from declared size"
                ),
                SizeMismatchPolicy::Reject => {
                    return Err(TransferError::SizeMismatch {
                        sequence: None,
                        expected: record.size,
                        actual: uploaded,
                    });
                }
            }
        }

        let sealed = deadline(
            "metadata complete",
            timeout,
            self.store.mark_completed(file_id),
        )
        .await?;
        self.locks.release(file_id);

        info!(
            file_id = %file_id,
            chunks = sealed.ordered_chunks().len(),
            size = sealed.size,
            "upload completed"
        );
        Ok(sealed)
    }

    /// Uploads a whole in-memory payload: init, concurrent chunk uploads,
    /// complete.
    pub async fn upload_bytes(
        &self,
        name: &str,
        mime_type: &str,
        data: Bytes,
        destination: i64,
    ) -> Result<FileRecord, TransferError> {
        let size = i64::try_from(data.len())
            .map_err(|_| TransferError::Validation("payload too large".into()))?;
        let record = self.init_upload(name, size, mime_type).await?;
        let chunk_size = self
            .config
            .upload_chunk_size
            .min(self.config.max_chunk_size) as usize;

        stream::iter(ChunkSplitter::new(data, chunk_size))
            .map(|(sequence, chunk)| self.upload_chunk(record.id, sequence, chunk, destination))
            .buffer_unordered(self.config.upload_concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await?;

        self.complete_upload(record.id).await
    }

    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.locks.len()
    }
}
