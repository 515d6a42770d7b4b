//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty stdout output
//! - Rolling JSON log files
//! - Secret scrubbing for error text

pub mod logger;
pub mod secret_scrubbing;

pub use logger::LoggerImpl;
pub use secret_scrubbing::SecretScrubber;
