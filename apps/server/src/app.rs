//! Wires the pool, store and service together and serves HTTP.

use std::sync::Arc;

use anyhow::Context;
use chunkvault_bot_pool::{AccountPool, BotAccount, MemoryBackend};
use chunkvault_metadata::{DiskStore, MemoryStore, MetadataStore, spawn_sweeper};
use chunkvault_transfer::FileService;
use tokio_util::sync::CancellationToken;

use crate::config::{BackendKind, Config, StoreKind};
use crate::routes;
use crate::state::AppState;

/// Runs the server until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // -- Account pool --
    let pool = build_pool(&config).await?;

    // -- Metadata store --
    let store = build_store(&config).await?;

    // -- Pending-upload sweeper --
    let sweeper = spawn_sweeper(
        store.clone(),
        config.pending_retention(),
        config.sweep_interval(),
        cancel.clone(),
    );

    // -- HTTP --
    let service = Arc::new(FileService::new(
        Arc::new(pool),
        store,
        config.transfer.clone(),
    ));
    let app = routes::router(AppState::new(service, config.destination));

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    tracing::info!(addr = %listener.local_addr()?, "HTTP server listening");

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("SIGINT received, shutting down");
        }
        shutdown.cancel();
    });

    let serve_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_cancel.cancelled().await })
        .await
        .context("HTTP server error")?;

    // -- Graceful shutdown --
    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!("sweeper task failed: {e}");
    }
    Ok(())
}

async fn build_pool(config: &Config) -> anyhow::Result<AccountPool> {
    match config.backend {
        BackendKind::Telegram => AccountPool::connect(&config.bot_tokens, &config.http_settings())
            .await
            .context("building bot pool"),
        BackendKind::Memory => {
            let backend = MemoryBackend::new();
            let accounts: Vec<Arc<dyn BotAccount>> = (1..=config.memory_accounts)
                .map(|i| Arc::new(backend.account(&format!("memory_bot_{i}"))) as Arc<dyn BotAccount>)
                .collect();
            tracing::warn!(
                accounts = accounts.len(),
                "using in-memory blob backend, data is lost on exit"
            );
            Ok(AccountPool::from_accounts(accounts))
        }
    }
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn MetadataStore>> {
    match config.store {
        StoreKind::Disk => {
            let store = DiskStore::open(config.data_dir.clone())
                .await
                .with_context(|| format!("opening store at {}", config.data_dir.display()))?;
            Ok(Arc::new(store))
        }
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
