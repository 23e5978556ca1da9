//! Metadata store for chunked files.
//!
//! The store is the source of truth for which chunks exist and where they
//! live. Two implementations ship: [`MemoryStore`] and the JSON-per-file
//! [`DiskStore`]. Both enforce the same contract through [`records::Records`].

pub mod disk;
pub mod error;
pub mod memory;
pub(crate) mod records;
pub mod sweeper;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use chunkvault_protocol::{ChunkRecord, FileId, FileRecord};

pub use disk::DiskStore;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use sweeper::spawn_sweeper;

/// Boxed future returned by [`MetadataStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Document store holding one [`FileRecord`] per logical file.
pub trait MetadataStore: Send + Sync {
    /// Persists a new record. Fails if the id is already taken.
    fn insert(&self, record: FileRecord) -> StoreFuture<'_, ()>;

    /// Loads a record by id.
    fn get(&self, id: FileId) -> StoreFuture<'_, FileRecord>;

    /// Returns the first chunk recorded for `sequence`, if any.
    fn find_chunk(&self, id: FileId, sequence: u32) -> StoreFuture<'_, Option<ChunkRecord>>;

    /// Appends a chunk and refreshes `updated_at`, atomically and only while
    /// the record is pending.
    fn append_chunk(&self, id: FileId, chunk: ChunkRecord) -> StoreFuture<'_, ()>;

    /// Seals the record. Sealing a completed record is a no-op.
    fn mark_completed(&self, id: FileId) -> StoreFuture<'_, FileRecord>;

    /// Completed records, newest first.
    fn list_completed(&self) -> StoreFuture<'_, Vec<FileRecord>>;

    /// Deletes pending records created before `older_than`. Returns how many
    /// were removed.
    fn purge_expired_pending(&self, older_than: DateTime<Utc>) -> StoreFuture<'_, usize>;
}
