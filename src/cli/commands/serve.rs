//! Implementation of the `dave serve` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use crate::infrastructure::http;
use crate::infrastructure::logging::LoggerImpl;
use crate::infrastructure::setup;

use super::load_config;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Configuration file (defaults to dave.yaml + dave.local.yaml)
    #[arg(short, long, env = "DAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    pub host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    pub port: Option<u16>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn execute(args: ServeArgs, _json_mode: bool) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let _logger = LoggerImpl::init(&config.logging).context("Failed to initialize logging")?;

    let state = setup::build_from_config(&config).await?;
    let pruner = state
        .limiter
        .spawn_pruner(config.rate_limit.prune_interval());

    info!(
        model = %config.upstream.model,
        rate_limiter = state.limiter.backend_name(),
        "Starting Dave gateway"
    );

    let result = http::serve(state, &config.server, shutdown_signal()).await;
    pruner.abort();
    result
}
