//! Circuit breaker around the generation API.
//!
//! One breaker instance is shared by every caller in the process. The state
//! lives behind a single mutex that is only held to read-and-update, never
//! across a network call.
//!
//! States:
//! - closed: calls flow; consecutive failures are counted
//! - open: calls are rejected without touching the upstream
//! - half-open: once the reset timeout has passed, exactly one probe is let
//!   through; its outcome closes the circuit or re-opens it

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::domain::errors::CircuitOpenError;
use crate::domain::models::CircuitBreakerSettings;
use crate::domain::ports::Clock;

/// Configuration for the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is allowed.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            reset_timeout: Duration::from_secs(settings.reset_timeout_secs),
        }
    }
}

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are blocked.
    Open,
    /// Reset timeout elapsed; the next caller becomes the probe.
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Snapshot of the breaker for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Seconds until a probe is admitted; zero unless open.
    pub retry_after_secs: u64,
    /// Times the circuit has opened since start-up.
    pub times_opened: u64,
}

#[derive(Debug, Default)]
struct BreakerState {
    open: bool,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
    times_opened: u64,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        Self::new(CircuitBreakerConfig::default(), clock)
    }

    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn since_last_failure(state: &BreakerState, now: Instant) -> Duration {
        state
            .last_failure
            .map_or(Duration::MAX, |at| now.saturating_duration_since(at))
    }

    /// Ask to make one upstream call.
    ///
    /// The returned permit must be settled with [`CallPermit::succeed`] or
    /// [`CallPermit::fail`]; dropping it unsettled leaves the counters alone.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, CircuitOpenError> {
        let now = self.clock.now();
        let mut state = self.lock();

        if !state.open {
            return Ok(CallPermit::new(Arc::clone(self), false));
        }

        let elapsed = Self::since_last_failure(&state, now);
        if elapsed >= self.config.reset_timeout && !state.probe_in_flight {
            state.probe_in_flight = true;
            info!(
                consecutive_failures = state.consecutive_failures,
                "Circuit half-open, admitting probe"
            );
            return Ok(CallPermit::new(Arc::clone(self), true));
        }

        Err(CircuitOpenError {
            retry_after: self.config.reset_timeout.saturating_sub(elapsed),
        })
    }

    fn on_success(&self, probe: bool) {
        let mut state = self.lock();
        if state.open {
            info!(
                previous_failures = state.consecutive_failures,
                "Circuit closed after successful probe"
            );
        }
        state.open = false;
        state.consecutive_failures = 0;
        if probe {
            state.probe_in_flight = false;
        }
    }

    fn on_failure(&self, probe: bool) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(now);
        if probe {
            state.probe_in_flight = false;
        }

        if !state.open && state.consecutive_failures >= self.config.failure_threshold {
            state.open = true;
            state.times_opened += 1;
            warn!(
                consecutive_failures = state.consecutive_failures,
                reset_timeout_secs = self.config.reset_timeout.as_secs(),
                "Circuit opened"
            );
        } else if probe {
            warn!(
                consecutive_failures = state.consecutive_failures,
                "Probe failed, circuit stays open"
            );
        }
    }

    fn on_abandon(&self, probe: bool) {
        if probe {
            self.lock().probe_in_flight = false;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.status().state
    }

    pub fn status(&self) -> CircuitStatus {
        let now = self.clock.now();
        let state = self.lock();
        let elapsed = Self::since_last_failure(&state, now);

        let (circuit, retry_after) = if !state.open {
            (CircuitState::Closed, Duration::ZERO)
        } else if elapsed >= self.config.reset_timeout {
            (CircuitState::HalfOpen, Duration::ZERO)
        } else {
            (
                CircuitState::Open,
                self.config.reset_timeout.saturating_sub(elapsed),
            )
        };

        CircuitStatus {
            state: circuit,
            consecutive_failures: state.consecutive_failures,
            retry_after_secs: retry_after.as_secs(),
            times_opened: state.times_opened,
        }
    }

    /// Force the circuit closed.
    pub fn reset(&self) {
        let mut state = self.lock();
        let times_opened = state.times_opened;
        *state = BreakerState {
            times_opened,
            ..BreakerState::default()
        };
        info!("Circuit manually reset");
    }
}

/// Permission to make one upstream call.
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    settled: bool,
}

impl CallPermit {
    const fn new(breaker: Arc<CircuitBreaker>, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    /// True if this call is the half-open probe.
    pub const fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandon(self.probe);
        }
    }
}
