//! Gemini generation API adapter.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::{GeminiConfig, GeminiTransport};
