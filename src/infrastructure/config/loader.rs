use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing upstream API key: set upstream.api_key, DAVE_UPSTREAM__API_KEY or GEMINI_API_KEY")]
    MissingApiKey,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid failure_threshold: {0}. Must be at least 1")]
    InvalidFailureThreshold(u32),

    #[error("Invalid reset_timeout_secs: {0}. Must be at least 1")]
    InvalidResetTimeout(u64),

    #[error("Invalid limits for tier '{0}': every limit must be positive")]
    InvalidTierLimits(String),

    #[error("Invalid port: {0}")]
    InvalidPort(u16),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. dave.yaml
    /// 3. dave.local.yaml (optional local overrides)
    /// 4. Environment variables (DAVE_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .merge(Yaml::file("dave.yaml"))
            .merge(Yaml::file("dave.local.yaml"))
            .merge(Env::prefixed("DAVE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment variables still win.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config: Config = Self::figment()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("DAVE_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new().merge(Serialized::defaults(Config::default()))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.upstream.resolved_api_key().is_none() {
            return Err(ConfigError::MissingApiKey);
        }

        if config.server.port == 0 {
            return Err(ConfigError::InvalidPort(config.server.port));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold(
                config.circuit_breaker.failure_threshold,
            ));
        }

        if config.circuit_breaker.reset_timeout_secs == 0 {
            return Err(ConfigError::InvalidResetTimeout(
                config.circuit_breaker.reset_timeout_secs,
            ));
        }

        for (tier, limits) in config.rate_limit.tiers.iter() {
            if limits.requests_per_minute == 0
                || limits.requests_per_day == 0
                || limits.tokens_per_minute == 0
                || limits.tokens_per_day == 0
            {
                return Err(ConfigError::InvalidTierLimits(tier.as_str().to_string()));
            }
        }

        if config.upstream.embedding_dimension == 0 {
            return Err(ConfigError::ValidationFailed(
                "upstream.embedding_dimension must be positive".to_string(),
            ));
        }

        for entry in &config.api_keys {
            if entry.key.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "api_keys entries need a non-empty key".to_string(),
                ));
            }
        }

        Ok(())
    }
}
