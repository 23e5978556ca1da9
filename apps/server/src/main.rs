//! chunkvault HTTP server entry point.

mod app;
mod config;
mod error;
mod routes;
mod state;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Chunked object store over a bot account pool")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CHUNKVAULT_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting chunkvault");

    let args = Args::parse();
    let config = config::Config::load(args.config.as_deref())?;
    tracing::info!(
        listen = %config.listen,
        backend = ?config.backend,
        store = ?config.store,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("chunkvault shut down cleanly");
    Ok(())
}
