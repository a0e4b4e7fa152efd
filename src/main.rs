//! Self-healing settlement worker.
//!
//! Drives a queue of payment intents through an EVM-style JSON-RPC
//! endpoint: polls the Store for PENDING rows, hands them to a pool of
//! workers that build/sign/broadcast under a shared submission lock,
//! classifies failures into retry-or-DLQ, and keeps a single signer's
//! nonce monotonic across the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use settler_chain::{AlloyChain, LocalAlloySigner};
use settler_core::{init_config, SettlerConfig, Supervisor, SupervisorConfig};
use settler_store::PostgresStore;

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,settler_core=debug,settler_chain=debug")),
        )
        .init();

    let config = SettlerConfig::from_env();
    config.log_config();
    init_config(config.clone());

    if config.private_key.is_empty() {
        anyhow::bail!("PRIVATE_KEY must be set");
    }

    info!("connecting to chain and store");
    let chain = Arc::new(
        AlloyChain::connect(&config.rpc_url)
            .await
            .context("failed to connect to chain RPC")?,
    );
    let signer = Arc::new(
        LocalAlloySigner::from_private_key(&config.private_key)
            .context("failed to construct signer from PRIVATE_KEY")?,
    );
    let store = Arc::new(
        PostgresStore::connect(&config.database_url)
            .await
            .context("failed to connect to store")?,
    );
    store.migrate().await.context("failed to run store migrations")?;

    let supervisor = Supervisor::new(
        store,
        chain,
        signer,
        SupervisorConfig {
            worker_count: config.worker_count,
            poll_interval: std::time::Duration::from_millis(config.poll_interval_ms),
            chain_id: config.chain_id,
            max_retries: config.max_retries,
        },
    );

    let cancellation = supervisor.cancellation_token();
    let mut run = tokio::spawn(async move { supervisor.run().await });

    tokio::select! {
        result = &mut run => {
            result.context("supervisor task panicked")??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, waiting for in-flight work to release");
            cancellation.cancel();
            run.await.context("supervisor task panicked")??;
        }
    }

    info!("settlement worker exited cleanly");
    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ┌─┐┌─┐┌┬┐┌┬┐┬  ┌─┐┬─┐
    └─┐├┤  │  │ │  ├┤ ├┬┘
    └─┘└─┘ ┴  ┴ ┴─┘└─┘┴└─
    Settlement Worker v0.1.0
    "#
    );
}
