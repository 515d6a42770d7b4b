//! Guardrail orchestration.
//!
//! Runs the rate limiter, the injection detector and the topic filter in
//! that order and stops at the first block. The limiter goes first because
//! it needs no text parsing and stops floods before any other work.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::models::{GuardrailResult, IdentityParts, Tier};
use crate::services::injection_detector::InjectionDetector;
use crate::services::rate_limiter::SlidingWindowLimiter;
use crate::services::topic_filter::TopicFilter;

/// Counters for monitoring.
#[derive(Debug, Default)]
pub struct GuardrailMetrics {
    pub checks: AtomicU64,
    pub rate_limited: AtomicU64,
    pub injections_blocked: AtomicU64,
    pub off_topic_redirected: AtomicU64,
}

/// Point-in-time copy of [`GuardrailMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardrailMetricsSnapshot {
    pub checks: u64,
    pub rate_limited: u64,
    pub injections_blocked: u64,
    pub off_topic_redirected: u64,
}

impl GuardrailMetrics {
    fn count(&self, result: &GuardrailResult) {
        use crate::domain::models::BlockReason as R;

        self.checks.fetch_add(1, Ordering::Relaxed);
        let counter = match result.reason() {
            None => return,
            Some(R::RateLimitMinute | R::RateLimitDay | R::TokenLimitMinute) => &self.rate_limited,
            Some(R::PromptInjection | R::SuspiciousContent) => &self.injections_blocked,
            Some(R::OffTopic) => &self.off_topic_redirected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GuardrailMetricsSnapshot {
        GuardrailMetricsSnapshot {
            checks: self.checks.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            injections_blocked: self.injections_blocked.load(Ordering::Relaxed),
            off_topic_redirected: self.off_topic_redirected.load(Ordering::Relaxed),
        }
    }
}

pub struct Guardrails {
    limiter: Arc<SlidingWindowLimiter>,
    detector: InjectionDetector,
    topics: TopicFilter,
    metrics: GuardrailMetrics,
}

impl Guardrails {
    pub fn new(limiter: Arc<SlidingWindowLimiter>) -> Result<Self, regex::Error> {
        Ok(Self {
            limiter,
            detector: InjectionDetector::new()?,
            topics: TopicFilter::new(),
            metrics: GuardrailMetrics::default(),
        })
    }

    pub const fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    pub const fn metrics(&self) -> &GuardrailMetrics {
        &self.metrics
    }

    /// Run every check; on a full pass the result carries the detected topic.
    #[instrument(skip_all, fields(tier = %tier))]
    pub async fn check(&self, message: &str, identity: &IdentityParts, tier: Tier) -> GuardrailResult {
        let result = self.run_checks(message, identity, tier).await;
        self.metrics.count(&result);

        if let GuardrailResult::Blocked(block) = &result {
            info!(
                identity = %identity.identity(),
                reason = block.reason.as_str(),
                severity = block.severity.as_str(),
                "Message blocked by guardrails"
            );
        }
        result
    }

    async fn run_checks(&self, message: &str, identity: &IdentityParts, tier: Tier) -> GuardrailResult {
        let rate = self.limiter.check(&identity.identity(), tier).await;
        if rate.is_blocked() {
            return rate;
        }

        let injection = self.detector.check(message);
        if injection.is_blocked() {
            return injection;
        }

        self.topics.check(message)
    }

    /// Record a completed request against the caller's quotas.
    pub async fn record_request(&self, identity: &IdentityParts, tokens_used: u64) {
        self.limiter.record(&identity.identity(), tokens_used).await;
    }
}
