use chunkvault_protocol::{FileId, FileRecord, expected_chunks};

use crate::TransferError;
use crate::config::TransferConfig;

/// Parses a textual file id.
pub fn parse_file_id(raw: &str) -> Result<FileId, TransferError> {
    raw.parse()
        .map_err(|_| TransferError::Validation(format!("bad id format: {raw:?}")))
}

/// Checks an upload request and returns the declared size as unsigned.
///
/// Rejects:
/// - Empty names
/// - Non-positive sizes
/// - Sizes needing more than `max_chunks_per_file` chunks of `max_chunk_size`
pub fn validate_init(config: &TransferConfig, name: &str, size: i64) -> Result<u64, TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::Validation("file name is required".into()));
    }
    if size <= 0 {
        return Err(TransferError::Validation(format!(
            "invalid file size: {size}"
        )));
    }

    let size = size as u64;
    let chunks = expected_chunks(size, config.max_chunk_size);
    if chunks > u64::from(config.max_chunks_per_file) {
        return Err(TransferError::Validation(format!(
            "file too large: would require {chunks} chunks (max: {})",
            config.max_chunks_per_file
        )));
    }
    Ok(size)
}

/// Checks one chunk before it is sent to the backend.
pub fn validate_chunk(config: &TransferConfig, sequence: u32, len: usize) -> Result<(), TransferError> {
    if len == 0 {
        return Err(TransferError::Validation(format!(
            "chunk {sequence} is empty"
        )));
    }
    if len as u64 > config.max_chunk_size {
        return Err(TransferError::Validation(format!(
            "chunk size {len} exceeds maximum {}",
            config.max_chunk_size
        )));
    }
    if sequence >= config.max_chunks_per_file {
        return Err(TransferError::Validation(format!(
            "sequence {sequence} out of range (limit: {})",
            config.max_chunks_per_file
        )));
    }
    Ok(())
}

/// Checks that a record's chunks cover `0..N-1` with no gaps.
pub fn validate_complete(record: &FileRecord) -> Result<(), TransferError> {
    if record.chunks.is_empty() {
        return Err(TransferError::Validation(format!(
            "upload {} has no chunks",
            record.id
        )));
    }
    let missing = record.missing_sequences();
    if !missing.is_empty() {
        return Err(TransferError::Validation(format!(
            "upload {} is missing chunks {missing:?}",
            record.id
        )));
    }
    Ok(())
}
