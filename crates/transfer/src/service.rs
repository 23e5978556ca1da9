//! Facade wiring both pipelines to one pool, store and rate limiter.

use std::sync::Arc;

use bytes::Bytes;
use chunkvault_bot_pool::AccountPool;
use chunkvault_metadata::MetadataStore;
use chunkvault_protocol::{ChunkRecord, FileId, FileRecord};
use tokio::io::AsyncWrite;

use crate::config::TransferConfig;
use crate::download::{AssemblyReport, DownloadPipeline};
use crate::error::TransferError;
use crate::limiter::RateLimiter;
use crate::upload::UploadPipeline;

/// The chunked object store.
///
/// Shared behind an `Arc` by every request handler.
pub struct FileService {
    pub(crate) upload: UploadPipeline,
    download: DownloadPipeline,
    pool: Arc<AccountPool>,
    config: Arc<TransferConfig>,
}

impl FileService {
    /// Builds the service with its own rate limiter from `config.rate_limit`.
    pub fn new(
        pool: Arc<AccountPool>,
        store: Arc<dyn MetadataStore>,
        config: TransferConfig,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Self::with_limiter(pool, store, config, limiter)
    }

    /// Builds the service around an existing limiter.
    pub fn with_limiter(
        pool: Arc<AccountPool>,
        store: Arc<dyn MetadataStore>,
        config: TransferConfig,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            upload: UploadPipeline::new(pool.clone(), store.clone(), config.clone()),
            download: DownloadPipeline::new(pool.clone(), store, config.clone(), limiter),
            pool,
            config,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn pool(&self) -> &AccountPool {
        &self.pool
    }

    pub async fn init_upload(
        &self,
        name: &str,
        size: i64,
        mime_type: &str,
    ) -> Result<FileRecord, TransferError> {
        self.upload.init_upload(name, size, mime_type).await
    }

    pub async fn upload_chunk(
        &self,
        file_id: FileId,
        sequence: u32,
        data: Bytes,
        destination: i64,
    ) -> Result<ChunkRecord, TransferError> {
        self.upload
            .upload_chunk(file_id, sequence, data, destination)
            .await
    }

    pub async fn complete_upload(&self, file_id: FileId) -> Result<FileRecord, TransferError> {
        self.upload.complete_upload(file_id).await
    }

    pub async fn upload_bytes(
        &self,
        name: &str,
        mime_type: &str,
        data: Bytes,
        destination: i64,
    ) -> Result<FileRecord, TransferError> {
        self.upload
            .upload_bytes(name, mime_type, data, destination)
            .await
    }

    pub async fn get_metadata(&self, file_id: FileId) -> Result<FileRecord, TransferError> {
        self.download.get_metadata(file_id).await
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>, TransferError> {
        self.download.list_files().await
    }

    pub async fn assemble<W>(
        &self,
        file_id: FileId,
        sink: &mut W,
    ) -> Result<AssemblyReport, TransferError>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.download.assemble(file_id, sink).await
    }
}
