//! Infrastructure layer module
//!
//! Adapters that satisfy the domain ports, plus process wiring:
//! - Configuration loading (figment)
//! - Logging (tracing)
//! - Gemini REST transport
//! - Usage backends for rate limiting (memory, Redis)
//! - In-memory conversation, prompt and knowledge stores
//! - HTTP surface (axum)

pub mod clock;
pub mod config;
pub mod gemini;
pub mod http;
pub mod logging;
pub mod memory;
pub mod setup;
pub mod usage;
