use std::sync::Arc;

use crate::services::{ChatService, SlidingWindowLimiter};

use super::auth::ApiKeyRegistry;

/// Shared state of the HTTP handlers.
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub api_keys: ApiKeyRegistry,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>, api_keys: ApiKeyRegistry) -> Self {
        let limiter = Arc::clone(chat.guardrails().limiter());
        Self {
            chat,
            limiter,
            api_keys,
        }
    }
}
