//! Clock adapters.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::domain::ports::Clock;

/// Wall clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock for deterministic window and timeout tests.
///
/// Clones share the same time, so a test can hand one clone to the service
/// under test and advance another.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<Instant>>,
}

impl MockClock {
    pub fn new(start: Instant) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut time = self
            .current_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *time += duration;
    }

    pub fn set(&self, instant: Instant) {
        *self
            .current_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self
            .current_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
