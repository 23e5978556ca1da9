//! In-process blob backend.
//!
//! Used for local development (`backend = "memory"`) and by the test suites.
//! Accounts created from one [`MemoryBackend`] share a blob store, and blob
//! ids are only resolvable by the account that sent them, as on Telegram.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::account::{BlobFuture, BotAccount, SentBlob};
use crate::error::BackendError;

const LINK_SCHEME: &str = "memory://";

#[derive(Debug)]
struct StoredBlob {
    owner: String,
    destination: i64,
    name: String,
    caption: String,
    data: Bytes,
}

#[derive(Debug, Default)]
struct Store {
    next_message_id: i64,
    blobs: HashMap<String, StoredBlob>,
    sends: usize,
    fetches: usize,
}

/// Shared store behind a set of [`MemoryAccount`]s.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account with the given identity on this backend.
    pub fn account(&self, identity: &str) -> MemoryAccount {
        MemoryAccount {
            identity: identity.to_string(),
            store: self.store.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        lock_store(&self.store)
    }

    /// Number of blobs held.
    pub fn blob_count(&self) -> usize {
        self.lock().blobs.len()
    }

    /// Total successful `send_blob` calls.
    pub fn send_count(&self) -> usize {
        self.lock().sends
    }

    /// Total successful `fetch` calls.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    /// Names of the blobs sent by `owner`, sorted.
    pub fn blob_names_for(&self, owner: &str) -> Vec<String> {
        let store = self.lock();
        let mut names: Vec<String> = store
            .blobs
            .values()
            .filter(|b| b.owner == owner)
            .map(|b| b.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Caption and destination of the blob named `name`.
    pub fn message_for(&self, name: &str) -> Option<(i64, String)> {
        self.lock()
            .blobs
            .values()
            .find(|b| b.name == name)
            .map(|b| (b.destination, b.caption.clone()))
    }
}

fn lock_store(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    // A panic while holding the lock cannot leave the map half-updated.
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An account on a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryAccount {
    identity: String,
    store: Arc<Mutex<Store>>,
}

impl MemoryAccount {
    fn store_blob(
        &self,
        destination: i64,
        name: &str,
        data: Bytes,
        caption: &str,
    ) -> Result<SentBlob, BackendError> {
        let mut store = lock_store(&self.store);
        store.next_message_id += 1;
        let message_id = store.next_message_id;
        let blob_id = format!("mem-{}-{message_id}", self.identity);

        store.blobs.insert(
            blob_id.clone(),
            StoredBlob {
                owner: self.identity.clone(),
                destination,
                name: name.to_string(),
                caption: caption.to_string(),
                data,
            },
        );
        store.sends += 1;

        Ok(SentBlob {
            message_id,
            blob_id,
        })
    }

    fn link_for(&self, blob_id: &str) -> Result<String, BackendError> {
        let store = lock_store(&self.store);
        match store.blobs.get(blob_id) {
            Some(blob) if blob.owner == self.identity => Ok(format!("{LINK_SCHEME}{blob_id}")),
            _ => Err(BackendError::Api {
                status: 400,
                description: "Bad Request: wrong file_id or the file is temporarily unavailable"
                    .into(),
            }),
        }
    }

    fn read(&self, url: &str) -> Result<Bytes, BackendError> {
        let blob_id = url
            .strip_prefix(LINK_SCHEME)
            .ok_or_else(|| BackendError::Protocol(format!("not a memory link: {url}")))?;
        let mut store = lock_store(&self.store);
        let data = store
            .blobs
            .get(blob_id)
            .map(|b| b.data.clone())
            .ok_or_else(|| BackendError::Api {
                status: 404,
                description: "Not Found".into(),
            })?;
        store.fetches += 1;
        Ok(data)
    }
}

impl BotAccount for MemoryAccount {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn send_blob<'a>(
        &'a self,
        destination: i64,
        name: &'a str,
        data: Bytes,
        caption: &'a str,
    ) -> BlobFuture<'a, SentBlob> {
        Box::pin(async move { self.store_blob(destination, name, data, caption) })
    }

    fn resolve_download_link<'a>(&'a self, blob_id: &'a str) -> BlobFuture<'a, String> {
        Box::pin(async move { self.link_for(blob_id) })
    }

    fn fetch<'a>(&'a self, url: &'a str) -> BlobFuture<'a, Bytes> {
        Box::pin(async move { self.read(url) })
    }
}
