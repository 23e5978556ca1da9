//! Scripted bot account and fixtures shared by the pipeline tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chunkvault_bot_pool::{
    AccountPool, BackendError, BlobFuture, BotAccount, MemoryAccount, MemoryBackend, SentBlob,
};
use chunkvault_metadata::{MemoryStore, MetadataStore};
use tokio::sync::Barrier;

use crate::config::TransferConfig;
use crate::service::FileService;

pub(crate) const DEST: i64 = -100_123;

/// Memory account with injectable failures and delays.
pub(crate) struct ScriptedAccount {
    inner: MemoryAccount,
    sends: AtomicUsize,
    resolves: AtomicUsize,
    resolves_in_flight: Arc<AtomicUsize>,
    resolve_peak: AtomicUsize,
    send_failures: Mutex<VecDeque<BackendError>>,
    send_barrier: Mutex<Option<Arc<Barrier>>>,
    resolve_delays: Mutex<HashMap<String, Duration>>,
    failing_blobs: Mutex<HashSet<String>>,
    truncated_blobs: Mutex<HashSet<String>>,
}

impl ScriptedAccount {
    pub(crate) fn new(backend: &MemoryBackend, identity: &str) -> Self {
        Self {
            inner: backend.account(identity),
            sends: AtomicUsize::new(0),
            resolves: AtomicUsize::new(0),
            resolves_in_flight: Arc::new(AtomicUsize::new(0)),
            resolve_peak: AtomicUsize::new(0),
            send_failures: Mutex::new(VecDeque::new()),
            send_barrier: Mutex::new(None),
            resolve_delays: Mutex::new(HashMap::new()),
            failing_blobs: Mutex::new(HashSet::new()),
            truncated_blobs: Mutex::new(HashSet::new()),
        }
    }

    /// Calls that reached `send_blob`, failed ones included.
    pub(crate) fn send_calls(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub(crate) fn resolve_calls(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    /// Most `resolve_download_link` calls seen running at once.
    pub(crate) fn resolve_peak(&self) -> usize {
        self.resolve_peak.load(Ordering::SeqCst)
    }

    /// The next `send_blob` calls fail with these errors, in order.
    pub(crate) fn fail_sends(&self, errors: impl IntoIterator<Item = BackendError>) {
        self.send_failures.lock().unwrap().extend(errors);
    }

    /// Every `send_blob` waits on `barrier` before storing.
    pub(crate) fn hold_sends_at(&self, barrier: Arc<Barrier>) {
        *self.send_barrier.lock().unwrap() = Some(barrier);
    }

    pub(crate) fn delay_resolve(&self, blob_id: &str, delay: Duration) {
        self.resolve_delays
            .lock()
            .unwrap()
            .insert(blob_id.to_string(), delay);
    }

    pub(crate) fn fail_resolve(&self, blob_id: &str) {
        self.failing_blobs.lock().unwrap().insert(blob_id.to_string());
    }

    /// Fetches of this blob return one byte less than stored.
    pub(crate) fn truncate_fetch(&self, blob_id: &str) {
        self.truncated_blobs
            .lock()
            .unwrap()
            .insert(blob_id.to_string());
    }
}

impl BotAccount for ScriptedAccount {
    fn identity(&self) -> &str {
        self.inner.identity()
    }

    fn send_blob<'a>(
        &'a self,
        destination: i64,
        name: &'a str,
        data: Bytes,
        caption: &'a str,
    ) -> BlobFuture<'a, SentBlob> {
        Box::pin(async move {
            self.sends.fetch_add(1, Ordering::SeqCst);
            let barrier = self.send_barrier.lock().unwrap().clone();
            if let Some(barrier) = barrier {
                barrier.wait().await;
            }
            let failure = self.send_failures.lock().unwrap().pop_front();
            if let Some(e) = failure {
                return Err(e);
            }
            self.inner.send_blob(destination, name, data, caption).await
        })
    }

    fn resolve_download_link<'a>(&'a self, blob_id: &'a str) -> BlobFuture<'a, String> {
        Box::pin(async move {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            let _in_flight = InFlight::enter(&self.resolves_in_flight, &self.resolve_peak);
            let delay = self.resolve_delays.lock().unwrap().get(blob_id).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing_blobs.lock().unwrap().contains(blob_id) {
                return Err(BackendError::Api {
                    status: 400,
                    description: "Bad Request: file is too big".into(),
                });
            }
            self.inner.resolve_download_link(blob_id).await
        })
    }

    fn fetch<'a>(&'a self, url: &'a str) -> BlobFuture<'a, Bytes> {
        Box::pin(async move {
            let data = self.inner.fetch(url).await?;
            let blob_id = url.strip_prefix("memory://").unwrap_or(url);
            if self.truncated_blobs.lock().unwrap().contains(blob_id) {
                return Ok(data.slice(..data.len().saturating_sub(1)));
            }
            Ok(data)
        })
    }
}

/// Counts a call as running until dropped.
struct InFlight {
    count: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(count: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = count.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            count: count.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A service wired to scripted accounts and a memory store.
pub(crate) struct Harness {
    pub(crate) service: FileService,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) accounts: Vec<Arc<ScriptedAccount>>,
    pub(crate) backend: MemoryBackend,
}

impl Harness {
    pub(crate) fn new(identities: &[&str], config: TransferConfig) -> Self {
        let backend = MemoryBackend::new();
        let accounts: Vec<Arc<ScriptedAccount>> = identities
            .iter()
            .map(|id| Arc::new(ScriptedAccount::new(&backend, id)))
            .collect();
        let pool = AccountPool::from_accounts(
            accounts
                .iter()
                .map(|a| a.clone() as Arc<dyn BotAccount>)
                .collect(),
        );
        let store = Arc::new(MemoryStore::new());
        let service = FileService::new(
            Arc::new(pool),
            store.clone() as Arc<dyn MetadataStore>,
            config,
        );
        Self {
            service,
            store,
            accounts,
            backend,
        }
    }

    pub(crate) fn account(&self, identity: &str) -> &ScriptedAccount {
        self.accounts
            .iter()
            .find(|a| a.identity() == identity)
            .expect("no such account")
    }

    pub(crate) fn total_send_calls(&self) -> usize {
        self.accounts.iter().map(|a| a.send_calls()).sum()
    }
}

/// Deterministic payload of `len` bytes.
pub(crate) fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}
