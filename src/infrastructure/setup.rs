//! Process wiring: builds every service from the loaded configuration.
//!
//! Dependencies are constructed once here and passed down explicitly.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::models::{Config, RateLimitConfig};
use crate::domain::ports::{
    Clock, ConversationStore, KnowledgeProvider, LlmTransport, PromptStore, UsageBackend,
};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::gemini::{GeminiConfig, GeminiTransport};
use crate::infrastructure::http::{ApiKeyRegistry, AppState};
use crate::infrastructure::memory::{
    InMemoryConversationStore, InMemoryKnowledgeBase, InMemoryPromptStore,
};
use crate::infrastructure::usage::{InMemoryUsageBackend, RedisUsageBackend, RedisUsageConfig};
use crate::services::{
    ChatService, CircuitBreaker, CircuitBreakerConfig, Guardrails, PromptManager,
    ResilientLlmClient, SlidingWindowLimiter,
};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Conversation, prompt and knowledge stores.
pub struct Collaborators {
    pub conversations: Arc<dyn ConversationStore>,
    pub prompts: Arc<dyn PromptStore>,
    pub knowledge: Arc<dyn KnowledgeProvider>,
}

impl Collaborators {
    pub fn in_memory() -> Self {
        Self {
            conversations: Arc::new(InMemoryConversationStore::new()),
            prompts: Arc::new(InMemoryPromptStore::new()),
            knowledge: Arc::new(InMemoryKnowledgeBase::new()),
        }
    }
}

/// Redis when configured and reachable, otherwise process memory.
pub async fn usage_backend(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Arc<dyn UsageBackend> {
    if let Some(url) = config.redis_url.as_deref() {
        let redis_config = RedisUsageConfig {
            key_prefix: config.redis_key_prefix.clone(),
        };
        match tokio::time::timeout(REDIS_CONNECT_TIMEOUT, RedisUsageBackend::connect(url, redis_config)).await {
            Ok(Ok(backend)) => {
                info!("Rate limiting backed by Redis");
                return Arc::new(backend);
            }
            Ok(Err(e)) => warn!(error = %e, "Redis unavailable; rate limiting is per-process"),
            Err(_) => warn!("Redis connection timed out; rate limiting is per-process"),
        }
    }
    Arc::new(InMemoryUsageBackend::new(clock, config.prune_interval()))
}

/// Wire the services around an already-built transport and usage backend.
pub fn build_state(
    config: &Config,
    transport: Arc<dyn LlmTransport>,
    backend: Arc<dyn UsageBackend>,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
) -> Result<Arc<AppState>> {
    let limiter = Arc::new(
        SlidingWindowLimiter::new(backend, config.rate_limit.tiers.clone())
            .with_enabled(config.rate_limit.enabled),
    );
    let guardrails =
        Arc::new(Guardrails::new(limiter).context("Failed to compile guardrail patterns")?);

    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::from(&config.circuit_breaker),
        clock,
    ));
    let client = Arc::new(ResilientLlmClient::new(transport, breaker));

    let prompts = Arc::new(PromptManager::new(
        collaborators.prompts,
        Duration::from_secs(config.prompts.cache_ttl_secs),
        config.prompts.cache_max_entries,
    ));

    let chat = Arc::new(ChatService::new(
        guardrails,
        client,
        prompts,
        collaborators.conversations,
        collaborators.knowledge,
        config.chat.clone(),
    ));

    Ok(Arc::new(AppState::new(
        chat,
        ApiKeyRegistry::new(config.api_keys.clone()),
    )))
}

/// Build the full gateway from configuration.
pub async fn build_from_config(config: &Config) -> Result<Arc<AppState>> {
    let gemini = GeminiConfig::from_upstream(&config.upstream)
        .context("No upstream API key configured")?;
    let transport: Arc<dyn LlmTransport> =
        Arc::new(GeminiTransport::new(gemini).context("Failed to build Gemini transport")?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let backend = usage_backend(&config.rate_limit, Arc::clone(&clock)).await;

    build_state(
        config,
        transport,
        backend,
        Collaborators::in_memory(),
        clock,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::MockClock;

    #[tokio::test]
    async fn test_falls_back_to_memory_without_redis() {
        let config = RateLimitConfig::default();
        let backend = usage_backend(&config, Arc::new(MockClock::default())).await;
        assert_eq!(backend.name(), "memory");
        assert!(!backend.is_distributed());
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back() {
        let config = RateLimitConfig {
            redis_url: Some("redis://127.0.0.1:1/".to_string()),
            ..RateLimitConfig::default()
        };
        let backend = usage_backend(&config, Arc::new(MockClock::default())).await;
        assert!(!backend.is_distributed());
    }

    #[tokio::test]
    async fn test_build_from_config_requires_key() {
        temp_env::async_with_vars([("GEMINI_API_KEY", None::<&str>)], async {
            assert!(build_from_config(&Config::default()).await.is_err());
        })
        .await;
    }
}
