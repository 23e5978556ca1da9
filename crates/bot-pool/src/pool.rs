//! Round-robin pool of bot accounts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::try_join_all;
use tracing::{info, warn};

use crate::HttpSettings;
use crate::account::BotAccount;
use crate::error::PoolError;
use crate::telegram::TelegramBot;

/// Fixed set of accounts, chosen in rotation for uploads.
///
/// The account list never changes after construction, so selection is a
/// single atomic increment.
pub struct AccountPool {
    accounts: Vec<Arc<dyn BotAccount>>,
    next: AtomicUsize,
}

impl std::fmt::Debug for AccountPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountPool")
            .field("accounts", &self.identities())
            .finish()
    }
}

impl AccountPool {
    /// Builds a pool from already-constructed accounts.
    pub fn from_accounts(accounts: Vec<Arc<dyn BotAccount>>) -> Self {
        Self {
            accounts,
            next: AtomicUsize::new(0),
        }
    }

    /// Validates every token against the Bot API and builds the pool.
    ///
    /// Blank tokens are skipped. Any invalid token fails the whole pool so a
    /// bad credential is caught at startup rather than on the first upload.
    pub async fn connect(tokens: &[String], settings: &HttpSettings) -> Result<Self, PoolError> {
        let tokens: Vec<&str> = tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return Err(PoolError::NoAccounts);
        }

        let http = settings.build_client().map_err(PoolError::Client)?;
        let bots = try_join_all(tokens.iter().enumerate().map(|(index, token)| {
            let http = http.clone();
            async move {
                TelegramBot::connect(token, http, &settings.api_base_url)
                    .await
                    .map_err(|source| {
                        warn!(index, error = %source, "bot token rejected");
                        PoolError::Account { index, source }
                    })
            }
        }))
        .await?;

        let accounts: Vec<Arc<dyn BotAccount>> = bots
            .into_iter()
            .map(|b| Arc::new(b) as Arc<dyn BotAccount>)
            .collect();
        let pool = Self::from_accounts(accounts);
        info!(accounts = ?pool.identities(), "bot pool ready");
        Ok(pool)
    }

    /// Returns the next account in rotation, or `None` if the pool is empty.
    pub fn select_next(&self) -> Option<Arc<dyn BotAccount>> {
        if self.accounts.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.accounts.len();
        Some(self.accounts[index].clone())
    }

    /// Looks up the account with the given identity.
    pub fn find(&self, identity: &str) -> Option<Arc<dyn BotAccount>> {
        self.accounts
            .iter()
            .find(|a| a.identity() == identity)
            .cloned()
    }

    pub fn all(&self) -> &[Arc<dyn BotAccount>] {
        &self.accounts
    }

    pub fn identities(&self) -> Vec<String> {
        self.accounts
            .iter()
            .map(|a| a.identity().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
