//! Business logic: guardrails, resilience and the chat pipeline.

pub mod chat_service;
pub mod circuit_breaker;
pub mod guardrails;
pub mod injection_detector;
pub mod prompt_manager;
pub mod rate_limiter;
pub mod resilient_client;
pub mod suggestions;
pub mod topic_filter;

pub use chat_service::ChatService;
pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStatus};
pub use guardrails::{GuardrailMetrics, GuardrailMetricsSnapshot, Guardrails};
pub use injection_detector::InjectionDetector;
pub use prompt_manager::PromptManager;
pub use rate_limiter::SlidingWindowLimiter;
pub use resilient_client::{ResilientLlmClient, TextStream};
pub use topic_filter::TopicFilter;
