//! On-disk metadata store.
//!
//! One pretty-printed JSON document per file under a data directory
//! (`<dir>/<file id>.json`). Records are cached in memory. A mutation first
//! rewrites the affected document through a temporary file and a rename, then
//! updates the cache, so the cache never holds a change the disk lacks, even
//! when the call is dropped midway.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chunkvault_protocol::{ChunkRecord, FileId, FileRecord};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::records::Records;
use crate::{MetadataStore, StoreFuture};

const RECORD_EXT: &str = "json";

/// Persistent store backed by a directory of JSON documents.
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
    records: RwLock<Records>,
}

impl DiskStore {
    /// Opens (creating if needed) the store rooted at `dir` and loads every
    /// record found there.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let records = load_records(&dir).await?;
        info!(dir = %dir.display(), records = records.len(), "metadata store opened");
        Ok(Self {
            dir,
            records: RwLock::new(records),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: FileId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXT}"))
    }

    /// Writes a record document atomically.
    async fn persist(&self, record: &FileRecord) -> Result<(), StoreError> {
        let path = self.record_path(record.id);
        let tmp = path.with_extension(format!("{RECORD_EXT}.tmp"));
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(file_id = %record.id, chunks = record.chunks.len(), "persisted record");
        Ok(())
    }
}

/// Loads every `*.json` record in `dir`. Unreadable documents are skipped.
async fn load_records(dir: &Path) -> Result<Records, StoreError> {
    let mut loaded = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
            continue;
        }
        let data = tokio::fs::read(&path).await?;
        match serde_json::from_slice::<FileRecord>(&data) {
            Ok(record) => loaded.push(record),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
        }
    }
    Ok(Records::from_records(loaded))
}

impl MetadataStore for DiskStore {
    fn insert(&self, record: FileRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            records.check_vacant(record.id)?;
            self.persist(&record).await?;
            records.commit(record);
            Ok(())
        })
    }

    fn get(&self, id: FileId) -> StoreFuture<'_, FileRecord> {
        Box::pin(async move { self.records.read().await.get(id).cloned() })
    }

    fn find_chunk(&self, id: FileId, sequence: u32) -> StoreFuture<'_, Option<ChunkRecord>> {
        Box::pin(async move { self.records.read().await.find_chunk(id, sequence) })
    }

    fn append_chunk(&self, id: FileId, chunk: ChunkRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            let after = records.with_chunk(id, chunk, Utc::now())?;
            self.persist(&after).await?;
            records.commit(after);
            Ok(())
        })
    }

    fn mark_completed(&self, id: FileId) -> StoreFuture<'_, FileRecord> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            let (record, changed) = records.completed(id, Utc::now())?;
            if changed {
                self.persist(&record).await?;
                records.commit(record.clone());
            }
            Ok(record)
        })
    }

    fn list_completed(&self) -> StoreFuture<'_, Vec<FileRecord>> {
        Box::pin(async move { Ok(self.records.read().await.list_completed()) })
    }

    fn purge_expired_pending(&self, older_than: DateTime<Utc>) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let removed = self.records.write().await.remove_expired_pending(older_than);
            for id in &removed {
                match tokio::fs::remove_file(self.record_path(*id)).await {
                    Ok(()) => debug!(file_id = %id, "purged expired pending upload"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    // Reloaded and purged again on next start.
                    Err(e) => warn!(file_id = %id, error = %e, "failed to delete expired record"),
                }
            }
            Ok(removed.len())
        })
    }
}
