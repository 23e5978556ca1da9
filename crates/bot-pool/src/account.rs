//! The `BotAccount` abstraction.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::BackendError;

/// Boxed future returned by [`BotAccount`] methods.
pub type BlobFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// Reference to a blob stored by [`BotAccount::send_blob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBlob {
    /// Message that carries the blob in the destination chat.
    pub message_id: i64,
    /// Backend blob id, resolvable only by the account that sent it.
    pub blob_id: String,
}

/// One credential on the messaging backend.
///
/// The Telegram implementation lives in [`crate::telegram`]; an in-process
/// implementation for development lives in [`crate::memory`]. Keeping this a
/// trait lets the transfer pipelines run against either.
pub trait BotAccount: Send + Sync {
    /// Stable public identity (the bot username). Recorded as the chunk owner.
    fn identity(&self) -> &str;

    /// Sends `data` as a document named `name` to `destination`.
    fn send_blob<'a>(
        &'a self,
        destination: i64,
        name: &'a str,
        data: Bytes,
        caption: &'a str,
    ) -> BlobFuture<'a, SentBlob>;

    /// Resolves a blob id into a time-limited download URL.
    fn resolve_download_link<'a>(&'a self, blob_id: &'a str) -> BlobFuture<'a, String>;

    /// Downloads the full contents behind a link.
    fn fetch<'a>(&'a self, url: &'a str) -> BlobFuture<'a, Bytes>;
}
