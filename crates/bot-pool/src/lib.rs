//! Bot accounts that store chunk blobs.
//!
//! Each account is an independent credential on the messaging backend. The
//! [`AccountPool`] spreads uploads across accounts round-robin; downloads go
//! back to the account that uploaded the chunk.

pub mod account;
pub mod error;
pub mod memory;
pub mod pool;
pub mod telegram;

use std::time::Duration;

pub use account::{BlobFuture, BotAccount, SentBlob};
pub use error::{BackendError, PoolError};
pub use memory::{MemoryAccount, MemoryBackend};
pub use pool::AccountPool;
pub use telegram::TelegramBot;

/// Default Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Settings for the shared HTTP client used by every Telegram account.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Bot API base URL, without trailing slash.
    pub api_base_url: String,
    /// Hard ceiling on a single request, body transfer included.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(10 * 60),
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 100,
        }
    }
}

impl HttpSettings {
    /// Builds the HTTP client shared by all accounts.
    pub fn build_client(&self) -> Result<reqwest::Client, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build()?;
        Ok(client)
    }
}
