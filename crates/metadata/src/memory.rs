//! In-memory metadata store.

use chrono::{DateTime, Utc};
use chunkvault_protocol::{ChunkRecord, FileId, FileRecord};
use tokio::sync::RwLock;
use tracing::debug;

use crate::records::Records;
use crate::{MetadataStore, StoreFuture};

/// Volatile store for development and tests. Records are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, pending or completed.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl MetadataStore for MemoryStore {
    fn insert(&self, record: FileRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.records.write().await.insert(record) })
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
            let record = records.with_chunk(id, chunk, Utc::now())?;
            records.commit(record);
            Ok(())
        })
    }

    fn mark_completed(&self, id: FileId) -> StoreFuture<'_, FileRecord> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            let (record, changed) = records.completed(id, Utc::now())?;
            if changed {
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
                debug!(file_id = %id, "purged expired pending upload");
            }
            Ok(removed.len())
        })
    }
}
