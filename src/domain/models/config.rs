use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::chat::UserType;
use super::tier::{Tier, TierTable};

/// Main configuration structure for the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Generation API settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Circuit breaker around the generation API
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Tiered rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Prompt cache settings
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Chat pipeline settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Accepted API keys and the callers they authenticate
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Whole-request timeout applied to non-streaming routes
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8080
}

const fn default_request_timeout_secs() -> u64 {
    90
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Generation API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UpstreamConfig {
    /// API key (falls back to `GEMINI_API_KEY` when unset)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Per-call HTTP timeout in seconds
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}

const fn default_embedding_dimension() -> usize {
    768
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_top_p() -> f32 {
    0.9
}

const fn default_top_k() -> u32 {
    40
}

const fn default_max_output_tokens() -> u32 {
    2048
}

const fn default_upstream_timeout_secs() -> u64 {
    60
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    /// Configured key, else the `GEMINI_API_KEY` environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds before an open circuit admits a probe
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_reset_timeout_secs() -> u64 {
    60
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Shared store; the in-memory backend is used when unset or unreachable
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_redis_key_prefix")]
    pub redis_key_prefix: String,

    /// How often stale identities are swept from memory
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    #[serde(default)]
    pub tiers: TierTable,
}

const fn default_true() -> bool {
    true
}

fn default_redis_key_prefix() -> String {
    "ratelimit:".to_string()
}

const fn default_prune_interval_secs() -> u64 {
    300
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: None,
            redis_key_prefix: default_redis_key_prefix(),
            prune_interval_secs: default_prune_interval_secs(),
            tiers: TierTable::default(),
        }
    }
}

impl RateLimitConfig {
    pub const fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

/// Prompt cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PromptsConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Upper bound on cached prompt entries
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

const fn default_cache_max_entries() -> u64 {
    256
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

/// Chat pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatConfig {
    /// Prior messages sent to the model as history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Knowledge results folded into the system instruction
    #[serde(default = "default_knowledge_limit")]
    pub knowledge_limit: usize,
}

const fn default_history_limit() -> usize {
    10
}

const fn default_knowledge_limit() -> usize {
    3
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            knowledge_limit: default_knowledge_limit(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}

/// One accepted API key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ApiKeyConfig {
    pub key: String,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub tier: Tier,

    #[serde(default)]
    pub user_type: UserType,
}
