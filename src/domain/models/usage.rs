//! Usage accounting types shared by the limiter and its backends.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Length of the short rolling window.
pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Length of the long rolling window. Events older than this are garbage.
pub const DAY_WINDOW: Duration = Duration::from_secs(86_400);

/// One completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageEvent {
    pub recorded_at: Instant,
    pub tokens: u64,
}

impl UsageEvent {
    pub const fn new(recorded_at: Instant, tokens: u64) -> Self {
        Self {
            recorded_at,
            tokens,
        }
    }
}

/// Rolling-window counts for one identity at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounts {
    pub requests_minute: u32,
    pub requests_day: u32,
    pub tokens_minute: u64,
    pub tokens_day: u64,
}

impl WindowCounts {
    /// Fold one event of the given age into the counts.
    pub fn add(&mut self, age: Duration, tokens: u64) {
        if age < DAY_WINDOW {
            self.requests_day = self.requests_day.saturating_add(1);
            self.tokens_day = self.tokens_day.saturating_add(tokens);
        }
        if age < MINUTE_WINDOW {
            self.requests_minute = self.requests_minute.saturating_add(1);
            self.tokens_minute = self.tokens_minute.saturating_add(tokens);
        }
    }
}

/// Usage snapshot reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub requests_minute: u32,
    pub requests_minute_limit: u32,
    pub requests_day: u32,
    pub requests_day_limit: u32,
    pub tokens_minute: u64,
    pub tokens_minute_limit: u64,
    pub tokens_day: u64,
    pub tokens_day_limit: u64,
    /// True when counts come from the shared store rather than process memory.
    pub distributed: bool,
}
