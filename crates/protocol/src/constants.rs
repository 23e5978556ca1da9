use std::time::Duration;

/// Largest blob a single bot account may send (50 MiB Bot API limit).
pub const MAX_CHUNK_SIZE: u64 = 50 * 1024 * 1024;

/// Upper bound on the number of chunks one file may be split into.
pub const MAX_CHUNKS_PER_FILE: u32 = 1000;

/// Pending uploads older than this are purged by the sweeper.
pub const PENDING_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Prefix used when naming chunk blobs on the backend.
pub const CHUNK_NAME_PREFIX: &str = "chunk";

/// Blob name for a chunk: `chunk_<file id>_<sequence>`.
///
/// The name and caption let an operator recover a file from the chat
/// history alone if the metadata store is lost.
pub fn chunk_blob_name(file_id: &impl std::fmt::Display, sequence: u32) -> String {
    format!("{CHUNK_NAME_PREFIX}_{file_id}_{sequence}")
}

/// Caption attached to every chunk message.
pub fn chunk_caption(file_id: &impl std::fmt::Display, sequence: u32) -> String {
    format!("ID: {file_id}\nPart: {sequence}")
}
