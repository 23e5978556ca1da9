//! Server configuration.
//!
//! Read from a TOML file (`--config` or `CHUNKVAULT_CONFIG`). A missing file
//! means defaults. Environment variables override the file:
//! - `BOT_TOKENS`: comma separated bot tokens
//! - `TELEGRAM_GROUP_ID`: default destination chat
//! - `CHUNKVAULT_LISTEN`: listen address
//! - `CHUNKVAULT_DATA_DIR`: metadata directory for the disk store

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chunkvault_bot_pool::{DEFAULT_API_URL, HttpSettings};
use chunkvault_transfer::TransferConfig;
use serde::{Deserialize, Serialize};

/// Slowest accepted fetch rate, in tokens per second.
const MIN_RATE_PER_SECOND: f64 = 0.01;

/// Where chunk blobs are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Telegram,
    /// In-process blobs, lost on exit.
    Memory,
}

/// Where file records are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Disk,
    Memory,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listen address.
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub backend: BackendKind,

    /// Bot API tokens, one account each.
    #[serde(default)]
    pub bot_tokens: Vec<String>,

    /// Number of accounts created by the memory backend.
    #[serde(default = "default_memory_accounts")]
    pub memory_accounts: usize,

    #[serde(default = "default_api_url")]
    pub api_base_url: String,

    /// Chat that receives chunks when an upload names no destination.
    #[serde(default)]
    pub destination: i64,

    #[serde(default)]
    pub store: StoreKind,

    /// Directory holding one JSON document per file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Age in seconds after which unfinished uploads are purged.
    #[serde(default = "default_pending_retention")]
    pub pending_retention_secs: u64,

    /// Seconds between purge runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default)]
    pub transfer: TransferConfig,
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

fn default_memory_accounts() -> usize {
    3
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_pending_retention() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    60 * 60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backend: BackendKind::default(),
            bot_tokens: Vec::new(),
            memory_accounts: default_memory_accounts(),
            api_base_url: default_api_url(),
            destination: 0,
            store: StoreKind::default(),
            data_dir: default_data_dir(),
            pending_retention_secs: default_pending_retention(),
            sweep_interval_secs: default_sweep_interval(),
            transfer: TransferConfig::default(),
        }
    }
}

impl Config {
    /// Loads the file at `path` (defaults if absent), applies environment
    /// overrides and validates the result.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
            }
            Some(path) => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Config::default()
            }
            None => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(tokens) = lookup("BOT_TOKENS") {
            self.bot_tokens = tokens
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(group) = lookup("TELEGRAM_GROUP_ID") {
            self.destination = group
                .trim()
                .parse()
                .with_context(|| format!("TELEGRAM_GROUP_ID is not a chat id: {group}"))?;
        }
        if let Some(listen) = lookup("CHUNKVAULT_LISTEN") {
            self.listen = listen;
        }
        if let Some(dir) = lookup("CHUNKVAULT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend {
            BackendKind::Telegram => {
                anyhow::ensure!(
                    self.bot_tokens.iter().any(|t| !t.trim().is_empty()),
                    "telegram backend needs at least one bot token (BOT_TOKENS)"
                );
                anyhow::ensure!(
                    self.destination != 0,
                    "telegram backend needs a destination chat (TELEGRAM_GROUP_ID)"
                );
            }
            BackendKind::Memory => {
                anyhow::ensure!(self.memory_accounts > 0, "memory_accounts must be positive");
            }
        }
        anyhow::ensure!(
            self.transfer.max_chunk_size > 0,
            "transfer.max_chunk_size must be positive"
        );
        anyhow::ensure!(
            self.transfer.max_chunks_per_file > 0,
            "transfer.max_chunks_per_file must be positive"
        );
        let rate = self.transfer.rate_limit.per_second;
        anyhow::ensure!(
            rate.is_finite() && (rate <= 0.0 || rate >= MIN_RATE_PER_SECOND),
            "transfer.rate_limit.per_second must be finite and either <= 0 (unlimited) or at least {MIN_RATE_PER_SECOND}, got {rate}"
        );
        anyhow::ensure!(
            self.sweep_interval_secs > 0,
            "sweep_interval_secs must be positive"
        );
        Ok(())
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            api_base_url: self.api_base_url.trim_end_matches('/').to_string(),
            ..HttpSettings::default()
        }
    }

    pub fn pending_retention(&self) -> Duration {
        Duration::from_secs(self.pending_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
