pub mod chat;
pub mod config;
pub mod guardrail;
pub mod identity;
pub mod tier;
pub mod usage;

pub use chat::{
    Caller, ChatAnswer, ChatReply, ChatRequest, Conversation, ConversationDetail,
    ConversationStart, ConversationStatus, ConversationSummary, Resource, Role, StoredMessage,
    StreamEvent, UserContext, UserType,
};
pub use config::{
    ApiKeyConfig, ChatConfig, CircuitBreakerSettings, Config, LoggingConfig, PromptsConfig,
    RateLimitConfig, RotationPolicy, ServerConfig, UpstreamConfig,
};
pub use guardrail::{BlockReason, GuardrailBlock, GuardrailResult, Severity, Topic};
pub use identity::{Identity, IdentityParts};
pub use tier::{Tier, TierLimits, TierTable, UnknownTier};
pub use usage::{UsageEvent, UsageStats, WindowCounts, DAY_WINDOW, MINUTE_WINDOW};
