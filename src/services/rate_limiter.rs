//! Tiered sliding-window rate limiter.
//!
//! Checks run in a fixed order (requests per minute, requests per day,
//! tokens per minute) and the first exceeded quota wins. Tokens per day are
//! recorded and reported but never enforced at check time.
//!
//! The in-memory backend is only correct for a single process; multi-process
//! deployments must point every replica at the same Redis backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::domain::models::{
    BlockReason, GuardrailResult, Identity, Severity, Tier, TierLimits, TierTable, UsageStats,
    WindowCounts,
};
use crate::domain::ports::UsageBackend;

pub const MINUTE_LIMIT_MESSAGE: &str = "You've sent several messages quickly. \
Please wait a moment before your next message. I'm still here to help!";

pub const DAY_LIMIT_MESSAGE: &str = "You've reached your daily message limit. \
Please come back tomorrow, or consider upgrading for more conversations. \
I look forward to helping you more!";

pub const TOKEN_LIMIT_MESSAGE: &str = "I've been doing a lot of thinking for you! \
Let's take a brief pause. Try again in a minute.";

pub struct SlidingWindowLimiter {
    backend: Arc<dyn UsageBackend>,
    tiers: TierTable,
    enabled: bool,
}

impl SlidingWindowLimiter {
    pub fn new(backend: Arc<dyn UsageBackend>, tiers: TierTable) -> Self {
        Self {
            backend,
            tiers,
            enabled: true,
        }
    }

    /// A disabled limiter still records usage but never blocks.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_distributed(&self) -> bool {
        self.backend.is_distributed()
    }

    pub const fn limits(&self, tier: Tier) -> &TierLimits {
        self.tiers.get(tier)
    }

    /// Compare counts against a quota row.
    pub fn evaluate(counts: &WindowCounts, limits: &TierLimits) -> GuardrailResult {
        if counts.requests_minute >= limits.requests_per_minute {
            return GuardrailResult::blocked(
                BlockReason::RateLimitMinute,
                Severity::Low,
                MINUTE_LIMIT_MESSAGE,
            );
        }

        if counts.requests_day >= limits.requests_per_day {
            return GuardrailResult::blocked(
                BlockReason::RateLimitDay,
                Severity::Medium,
                DAY_LIMIT_MESSAGE,
            );
        }

        if counts.tokens_minute >= limits.tokens_per_minute {
            return GuardrailResult::blocked(
                BlockReason::TokenLimitMinute,
                Severity::Low,
                TOKEN_LIMIT_MESSAGE,
            );
        }

        GuardrailResult::allowed()
    }

    /// Check whether `identity` may make another request.
    ///
    /// Backend failures fail open: the request is allowed and the error logged.
    #[instrument(skip_all, fields(identity = %identity, tier = %tier))]
    pub async fn check(&self, identity: &Identity, tier: Tier) -> GuardrailResult {
        if !self.enabled {
            return GuardrailResult::allowed();
        }

        let counts = match self.backend.window_counts(identity).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, backend = self.backend.name(), "Rate limit check failed, allowing request");
                return GuardrailResult::allowed();
            }
        };

        let result = Self::evaluate(&counts, self.tiers.get(tier));
        if let Some(reason) = result.reason() {
            info!(reason = reason.as_str(), ?counts, "Rate limit exceeded");
        }
        result
    }

    /// Record one completed request.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn record(&self, identity: &Identity, tokens_used: u64) {
        if let Err(e) = self.backend.record(identity, tokens_used).await {
            warn!(error = %e, backend = self.backend.name(), "Failed to record usage");
        }
    }

    /// Current usage against the tier's quotas. Zero counts on backend failure.
    pub async fn usage(&self, identity: &Identity, tier: Tier) -> UsageStats {
        let counts = self
            .backend
            .window_counts(identity)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, identity = %identity, "Failed to read usage");
                WindowCounts::default()
            });
        let limits = self.tiers.get(tier);

        UsageStats {
            requests_minute: counts.requests_minute,
            requests_minute_limit: limits.requests_per_minute,
            requests_day: counts.requests_day,
            requests_day_limit: limits.requests_per_day,
            tokens_minute: counts.tokens_minute,
            tokens_minute_limit: limits.tokens_per_minute,
            tokens_day: counts.tokens_day,
            tokens_day_limit: limits.tokens_per_day,
            distributed: self.backend.is_distributed(),
        }
    }

    /// Drop stale identities from the backend.
    pub async fn prune(&self) -> usize {
        match self.backend.prune().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Failed to prune usage");
                0
            }
        }
    }

    /// Prune on a fixed interval until the handle is aborted.
    pub fn spawn_pruner(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        info!(interval_secs = interval.as_secs(), "Starting rate-limit pruner");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.prune().await;
                debug!(removed, "Rate-limit prune pass complete");
            }
        })
    }
}
