//! Time source port.
//!
//! Rolling windows and circuit timeouts read time through this trait so tests
//! can drive them with a controllable clock.

use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Current monotonic time.
    fn now(&self) -> Instant;
}
