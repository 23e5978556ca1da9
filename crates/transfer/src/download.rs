//! Download side: metadata lookup, listing and ordered reassembly.
//!
//! Assembly fans out one task per chunk, bounded by a semaphore. Tasks send
//! `(sequence, result)` on one channel; a single consumer owns the sink and
//! writes chunks in sequence order through a [`ReorderBuffer`]. Peak memory is
//! roughly `download_concurrency * chunk size` in flight plus whatever waits
//! in the reorder buffer behind a slow early chunk.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chunkvault_bot_pool::{AccountPool, BotAccount};
use chunkvault_metadata::MetadataStore;
use chunkvault_protocol::{ChunkRecord, FileId, FileRecord};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{SizeMismatchPolicy, TransferConfig};
use crate::error::{TransferError, deadline};
use crate::limiter::RateLimiter;
use crate::reorder::ReorderBuffer;

/// Outcome of a successful assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyReport {
    pub chunks: usize,
    pub bytes_written: u64,
}

/// Reads metadata and reassembles completed files.
pub struct DownloadPipeline {
    pool: Arc<AccountPool>,
    store: Arc<dyn MetadataStore>,
    config: Arc<TransferConfig>,
    limiter: Arc<RateLimiter>,
}

impl DownloadPipeline {
    pub fn new(
        pool: Arc<AccountPool>,
        store: Arc<dyn MetadataStore>,
        config: Arc<TransferConfig>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            pool,
            store,
            config,
            limiter,
        }
    }

    pub async fn get_metadata(&self, file_id: FileId) -> Result<FileRecord, TransferError> {
        deadline(
            "metadata lookup",
            self.config.metadata_timeout,
            self.store.get(file_id),
        )
        .await
    }

    /// Completed files, newest first.
    pub async fn list_files(&self) -> Result<Vec<FileRecord>, TransferError> {
        deadline(
            "metadata list",
            self.config.metadata_timeout,
            self.store.list_completed(),
        )
        .await
    }

    /// Writes the file's bytes to `sink` in order.
    ///
    /// The first failed chunk aborts the assembly; bytes already written stay
    /// written. Fetches still waiting for a permit are cancelled, in-flight
    /// ones run to completion and their results are dropped.
    pub async fn assemble<W>(
        &self,
        file_id: FileId,
        sink: &mut W,
    ) -> Result<AssemblyReport, TransferError>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let record = self.get_metadata(file_id).await?;
        if !record.is_completed() {
            return Err(TransferError::NotCompleted(file_id));
        }

        let chunks = record.ordered_chunks();
        if chunks.is_empty() {
            return Ok(AssemblyReport {
                chunks: 0,
                bytes_written: 0,
            });
        }
        let missing = record.missing_sequences();
        if !missing.is_empty() {
            return Err(TransferError::Corrupted {
                file_id,
                reason: format!("missing chunks {missing:?}"),
            });
        }

        let total = chunks.len();
        let started = Instant::now();
        info!(
            file_id = %file_id,
            name = %record.name,
            chunks = total,
            concurrency = self.config.download_concurrency,
            "assembling file"
        );

        let cancel = CancellationToken::new();
        let _cancel_on_exit = cancel.clone().drop_guard();
        let permits = Arc::new(Semaphore::new(self.config.download_concurrency.max(1)));
        // Capacity for every result, so no task blocks on send after the
        // consumer has gone.
        let (results_tx, mut results_rx) = mpsc::channel(total);

        for chunk in chunks {
            let fetcher = ChunkFetcher {
                pool: self.pool.clone(),
                limiter: self.limiter.clone(),
                config: self.config.clone(),
                file_id,
            };
            let permits = permits.clone();
            let cancel = cancel.clone();
            let results_tx = results_tx.clone();

            tokio::spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return,
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                if cancel.is_cancelled() {
                    return;
                }
                let sequence = chunk.sequence;
                let result = fetcher.fetch(&chunk).await;
                let _ = results_tx.send((sequence, result)).await;
            });
        }
        drop(results_tx);

        let mut reorder = ReorderBuffer::new(total);
        let mut written: u64 = 0;
        for _ in 0..total {
            let Some((sequence, result)) = results_rx.recv().await else {
                return Err(TransferError::Corrupted {
                    file_id,
                    reason: "fetch tasks ended early".into(),
                });
            };

            let data = match result {
                Ok(data) => data,
                Err(e) => {
                    error!(file_id = %file_id, sequence, error = %e, "chunk fetch failed, aborting assembly");
                    return Err(TransferError::ChunkFailed {
                        sequence,
                        source: Box::new(e),
                    });
                }
            };

            reorder
                .insert(sequence as usize, data)
                .map_err(|e| TransferError::Corrupted {
                    file_id,
                    reason: e.to_string(),
                })?;
            while let Some(ready) = reorder.pop_ready() {
                sink.write_all(&ready).await?;
                written += ready.len() as u64;
            }
        }
        sink.flush().await?;

        if written != record.size {
            match self.config.size_mismatch {
                SizeMismatchPolicy::Warn => warn!(
                    file_id = %file_id,
                    declared = record.size,
                    written,
                    "assembled size differs from declared size"
                ),
                SizeMismatchPolicy::Reject => {
                    return Err(TransferError::SizeMismatch {
                        sequence: None,
                        expected: record.size,
                        actual: written,
                    });
                }
            }
        }

        info!(
            file_id = %file_id,
            chunks = total,
            bytes = written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "file assembled"
        );
        Ok(AssemblyReport {
            chunks: total,
            bytes_written: written,
        })
    }
}

/// Everything one fetch task needs, owned so the task can be spawned.
struct ChunkFetcher {
    pool: Arc<AccountPool>,
    limiter: Arc<RateLimiter>,
    config: Arc<TransferConfig>,
    file_id: FileId,
}

impl ChunkFetcher {
    async fn fetch(&self, chunk: &ChunkRecord) -> Result<Bytes, TransferError> {
        self.limiter.acquire().await;

        let account = self.account_for(chunk)?;
        let link = deadline(
            "link resolution",
            self.config.link_timeout,
            account.resolve_download_link(&chunk.blob_id),
        )
        .await?;
        let data = deadline(
            "chunk fetch",
            self.config.fetch_timeout,
            account.fetch(&link),
        )
        .await?;

        let actual = data.len() as u64;
        if actual != chunk.size {
            match self.config.size_mismatch {
                SizeMismatchPolicy::Warn => warn!(
                    file_id = %self.file_id,
                    sequence = chunk.sequence,
                    expected = chunk.size,
                    actual,
                    "chunk size mismatch"
                ),
                SizeMismatchPolicy::Reject => {
                    return Err(TransferError::SizeMismatch {
                        sequence: Some(chunk.sequence),
                        expected: chunk.size,
                        actual,
                    });
                }
            }
        }

        debug!(
            file_id = %self.file_id,
            sequence = chunk.sequence,
            bytes = actual,
            owner = %account.identity(),
            "chunk fetched"
        );
        Ok(data)
    }

    /// The uploading account, or the next pooled one if it is gone.
    fn account_for(&self, chunk: &ChunkRecord) -> Result<Arc<dyn BotAccount>, TransferError> {
        if let Some(account) = self.pool.find(&chunk.owner) {
            return Ok(account);
        }
        warn!(
            file_id = %self.file_id,
            sequence = chunk.sequence,
            owner = %chunk.owner,
            "owner account not in pool, using fallback"
        );
        self.pool.select_next().ok_or(TransferError::PoolExhausted)
    }
}
