use std::sync::Arc;

use chunkvault_transfer::FileService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FileService>,
    /// Chat used when an upload names no destination.
    pub destination: i64,
}

impl AppState {
    pub fn new(service: Arc<FileService>, destination: i64) -> Self {
        Self {
            service,
            destination,
        }
    }
}
