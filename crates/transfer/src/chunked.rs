use bytes::Bytes;

/// Splits an in-memory payload into fixed-size chunks without copying.
///
/// Yields `(sequence, chunk)` pairs; every chunk but the last is exactly
/// `chunk_size` bytes.
#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    data: Bytes,
    chunk_size: usize,
    sequence: u32,
}

impl ChunkSplitter {
    /// A `chunk_size` of 0 yields the whole payload as one chunk.
    pub fn new(data: Bytes, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            data.len().max(1)
        } else {
            chunk_size
        };
        Self {
            data,
            chunk_size,
            sequence: 0,
        }
    }

    /// Bytes not yet yielded.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }
}

impl Iterator for ChunkSplitter {
    type Item = (u32, Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let take = self.chunk_size.min(self.data.len());
        let chunk = self.data.split_to(take);
        let sequence = self.sequence;
        self.sequence += 1;
        Some((sequence, chunk))
    }
}
