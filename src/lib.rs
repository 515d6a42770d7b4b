//! Dave - career coach chat gateway
//!
//! Dave answers job-search questions for people in recovery. This crate is
//! the gateway in front of the language model: every message passes
//! guardrails (tiered rate limits, prompt-injection detection, a topic
//! policy) before it reaches a circuit-breaker protected Gemini client, and
//! answers are returned either whole or as a stream of named events.
//!
//! # Architecture
//!
//! The crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and the port traits
//! - **Service Layer** (`services`): guardrails, resilience and the chat pipeline
//! - **Infrastructure Layer** (`infrastructure`): config, logging, Gemini,
//!   Redis, in-memory stores and the axum HTTP surface
//! - **CLI Layer** (`cli`): `dave serve` and `dave check-config`

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{ChatError, CircuitOpenError, ClientError, UpstreamError};
pub use domain::models::{
    BlockReason, Caller, ChatReply, ChatRequest, Config, GuardrailResult, Identity,
    IdentityParts, StreamEvent, Tier, TierLimits,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ChatService, CircuitBreaker, Guardrails, ResilientLlmClient, SlidingWindowLimiter};
