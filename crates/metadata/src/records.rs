//! In-memory record map shared by both store implementations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chunkvault_protocol::{ChunkRecord, FileId, FileRecord, FileStatus};

use crate::error::StoreError;

#[derive(Debug, Default)]
pub(crate) struct Records {
    files: HashMap<FileId, FileRecord>,
}

impl Records {
    pub(crate) fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        Self {
            files: records.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }

    pub(crate) fn insert(&mut self, record: FileRecord) -> Result<(), StoreError> {
        self.check_vacant(record.id)?;
        self.commit(record);
        Ok(())
    }

    /// Replaces (or adds) a record unconditionally.
    pub(crate) fn commit(&mut self, record: FileRecord) {
        self.files.insert(record.id, record);
    }

    /// Fails if `id` is already taken.
    pub(crate) fn check_vacant(&self, id: FileId) -> Result<(), StoreError> {
        if self.files.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        Ok(())
    }

    pub(crate) fn get(&self, id: FileId) -> Result<&FileRecord, StoreError> {
        self.files.get(&id).ok_or(StoreError::NotFound(id))
    }

    pub(crate) fn find_chunk(
        &self,
        id: FileId,
        sequence: u32,
    ) -> Result<Option<ChunkRecord>, StoreError> {
        Ok(self.get(id)?.chunk(sequence).cloned())
    }

    /// The record as it would be after appending `chunk`. Nothing is stored.
    pub(crate) fn with_chunk(
        &self,
        id: FileId,
        chunk: ChunkRecord,
        now: DateTime<Utc>,
    ) -> Result<FileRecord, StoreError> {
        let mut record = self.get(id)?.clone();
        if record.status != FileStatus::Pending {
            return Err(StoreError::NotPending(id));
        }
        record.chunks.push(chunk);
        record.updated_at = now;
        Ok(record)
    }

    /// The record as it would be once completed, and whether that differs
    /// from what is stored. Nothing is stored.
    pub(crate) fn completed(
        &self,
        id: FileId,
        now: DateTime<Utc>,
    ) -> Result<(FileRecord, bool), StoreError> {
        let mut record = self.get(id)?.clone();
        if record.status == FileStatus::Completed {
            return Ok((record, false));
        }
        record.status = FileStatus::Completed;
        record.updated_at = now;
        Ok((record, true))
    }

    pub(crate) fn list_completed(&self) -> Vec<FileRecord> {
        let mut files: Vec<FileRecord> = self
            .files
            .values()
            .filter(|r| r.status == FileStatus::Completed)
            .cloned()
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        files
    }

    /// Removes pending records created before `older_than` and returns their ids.
    pub(crate) fn remove_expired_pending(&mut self, older_than: DateTime<Utc>) -> Vec<FileId> {
        let expired: Vec<FileId> = self
            .files
            .values()
            .filter(|r| r.status == FileStatus::Pending && r.created_at < older_than)
            .map(|r| r.id)
            .collect();
        for id in &expired {
            self.files.remove(id);
        }
        expired
    }
}
