//! Optional per-file upload locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chunkvault_protocol::FileId;
use tokio::sync::OwnedMutexGuard;

/// Map of file id to an async lock, created on demand and dropped when the
/// upload completes.
#[derive(Debug, Default)]
pub(crate) struct UploadLocks {
    locks: Mutex<HashMap<FileId, Arc<tokio::sync::Mutex<()>>>>,
}

impl UploadLocks {
    /// Waits for exclusive access to `id`.
    pub(crate) async fn lock(&self, id: FileId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub(crate) fn release(&self, id: FileId) {
        self.locks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
