use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a logical file, assigned at upload initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error returned when a textual file id is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid file id: {0}")]
pub struct InvalidFileId(pub String);

impl FromStr for FileId {
    type Err = InvalidFileId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| InvalidFileId(s.to_string()))
    }
}

impl From<Uuid> for FileId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a file. Only `Pending -> Completed` is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "completed")]
    Completed,
}

/// One uploaded piece of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Zero-based position of the chunk in the original byte stream.
    pub sequence: u32,
    /// Backend message that carries the blob.
    pub message_id: i64,
    /// Backend blob reference used to resolve a download link.
    pub blob_id: String,
    /// Identity of the bot account that uploaded the chunk.
    pub owner: String,
    /// Byte length as uploaded.
    pub size: u64,
}

/// Authoritative metadata for one logical file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
    pub status: FileStatus,
    /// Chunks in insertion order. Use [`FileRecord::ordered_chunks`] for
    /// sequence order.
    #[serde(default)]
    pub chunks: Vec<ChunkRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Creates a pending record with an empty chunk list.
    pub fn new_pending(name: &str, size: u64, mime_type: &str) -> Self {
        let now = Utc::now();
        Self {
            id: FileId::new(),
            name: name.to_string(),
            size,
            mime_type: mime_type.to_string(),
            status: FileStatus::Pending,
            chunks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == FileStatus::Completed
    }

    /// Returns the first chunk recorded for `sequence`, if any.
    pub fn chunk(&self, sequence: u32) -> Option<&ChunkRecord> {
        self.chunks.iter().find(|c| c.sequence == sequence)
    }

    /// Sum of the recorded chunk sizes, counting each sequence once.
    pub fn uploaded_bytes(&self) -> u64 {
        self.ordered_chunks().iter().map(|c| c.size).sum()
    }

    /// Chunks sorted by sequence with duplicate sequences collapsed to the
    /// earliest appended entry.
    pub fn ordered_chunks(&self) -> Vec<ChunkRecord> {
        let mut chunks = self.chunks.clone();
        // Stable sort keeps insertion order among equal sequences.
        chunks.sort_by_key(|c| c.sequence);
        chunks.dedup_by_key(|c| c.sequence);
        chunks
    }

    /// Sequences in `0..=max` that have no chunk, where `max` is the highest
    /// recorded sequence.
    pub fn missing_sequences(&self) -> Vec<u32> {
        let ordered = self.ordered_chunks();
        let Some(last) = ordered.last() else {
            return Vec::new();
        };
        let mut present = ordered.iter().map(|c| c.sequence).peekable();
        let mut missing = Vec::new();
        for seq in 0..=last.sequence {
            if present.peek() == Some(&seq) {
                present.next();
            } else {
                missing.push(seq);
            }
        }
        missing
    }
}

/// Number of chunks needed to hold `size` bytes at `chunk_size` bytes each.
pub fn expected_chunks(size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size)
}
