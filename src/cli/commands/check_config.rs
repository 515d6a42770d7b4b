//! Implementation of the `dave check-config` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

use super::load_config;

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Configuration file (defaults to dave.yaml + dave.local.yaml)
    #[arg(short, long, env = "DAVE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct CheckConfigOutput {
    pub valid: bool,
    pub bind_address: String,
    pub model: String,
    pub rate_limit_enabled: bool,
    pub redis_configured: bool,
    pub api_keys: usize,
}

impl CheckConfigOutput {
    fn from_config(config: &Config) -> Self {
        Self {
            valid: true,
            bind_address: config.server.bind_address(),
            model: config.upstream.model.clone(),
            rate_limit_enabled: config.rate_limit.enabled,
            redis_configured: config.rate_limit.redis_url.is_some(),
            api_keys: config.api_keys.len(),
        }
    }
}

impl CommandOutput for CheckConfigOutput {
    fn to_human(&self) -> String {
        [
            "Configuration is valid".to_string(),
            format!("  listen:      {}", self.bind_address),
            format!("  model:       {}", self.model),
            format!(
                "  rate limit:  {}{}",
                if self.rate_limit_enabled { "enabled" } else { "disabled" },
                if self.redis_configured { " (redis)" } else { "" }
            ),
            format!("  api keys:    {}", self.api_keys),
        ]
        .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: CheckConfigArgs, json_mode: bool) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    output(&CheckConfigOutput::from_config(&config), json_mode);
    Ok(())
}
