//! Bridge Relayer Service
//!
//! Runs every configured relay worker until Ctrl+C or the first fatal error.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin bridge-relayer -- --config config/relayer.toml
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! RELAYER_CONFIG_PATH=config/relayer.toml cargo run --bin bridge-relayer
//! ```

use anyhow::{Context, Result};
use bridge_relayer::{build_pool, Config, ShutdownTrigger};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bridge-relayer")]
#[command(about = "Relays BEEFY commitments and Ethereum messages between chains")]
struct Args {
    /// Path to relayer configuration file (default: config/relayer.toml or RELAYER_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Bridge Relayer");

    let config = Config::load_from_path(args.config.as_deref()).context("Failed to load configuration")?;
    info!("Configuration loaded successfully");
    info!("Failure policy: {:?}", config.relay.failure_policy);
    for worker in &config.workers {
        info!(
            "Worker {}: {}",
            worker.kind,
            if worker.enabled { "enabled" } else { "disabled" }
        );
    }

    let pool = build_pool(&config).context("Failed to build worker pool")?;

    let trigger = ShutdownTrigger::new();
    let mut run = tokio::spawn(pool.run(trigger.subscribe()));

    let result = tokio::select! {
        joined = &mut run => joined,
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, stopping workers...");
            trigger.trigger();
            run.await
        }
    };

    match result.context("Worker pool task panicked")? {
        Ok(()) => {
            info!("Relayer stopped");
            Ok(())
        }
        Err(e) => {
            error!("Relayer stopped with error: {}", e);
            Err(e.into())
        }
    }
}
