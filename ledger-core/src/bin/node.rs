//! Ledger node binary
//!
//! Boots an in-memory ledger from `LEDGER_*` environment variables (or a
//! TOML file given as the first argument) and runs until Ctrl-C. The
//! request layer embeds the library; this binary is for local runs.

use anyhow::Context;
use eledger_core::{Config, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting E-Ledger node");

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => Config::from_env().context("invalid LEDGER_* environment")?,
    };
    tracing::info!(
        consensus = ?config.consensus.mode,
        difficulty = config.consensus.difficulty,
        "configuration loaded"
    );

    let ledger = Ledger::open(config).await?;
    let genesis = ledger.get_block(0)?;
    tracing::info!(hash = %genesis.hash, "ledger ready");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down ledger node");
    let stats = ledger.chain_stats();
    tracing::info!(
        height = stats.height,
        transactions = stats.total_transactions,
        pending = stats.pending_transactions,
        "final chain state"
    );
    println!("{}", ledger.metrics().render()?);

    ledger.shutdown().await?;
    Ok(())
}
