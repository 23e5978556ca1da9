//! Chunked upload and order-preserving reassembly over a bot account pool.
//!
//! Uploads are split into sequence-numbered chunks, each stored as an
//! independent blob by whichever account the pool hands out next. Downloads
//! fetch chunks concurrently from their owning accounts and merge them back
//! into one ordered byte stream.

mod chunked;
pub mod config;
mod download;
mod error;
pub mod limiter;
mod locks;
mod reorder;
pub mod retry;
mod service;
mod upload;
mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use chunked::ChunkSplitter;
pub use config::{SizeMismatchPolicy, TransferConfig};
pub use download::{AssemblyReport, DownloadPipeline};
pub use error::TransferError;
pub use limiter::{RateLimit, RateLimiter};
pub use reorder::{ReorderBuffer, ReorderError};
pub use retry::RetryPolicy;
pub use service::FileService;
pub use upload::UploadPipeline;
pub use validation::{parse_file_id, validate_chunk, validate_complete, validate_init};
