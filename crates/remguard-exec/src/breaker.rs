//! Per-integration circuit breaker
//!
//! Closed until `failure_threshold` consecutive failures, then open for
//! `cooldown`. After the cooldown one probe is let through (half-open);
//! its result decides between closing and re-opening.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Breaker tunables
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// How long the breaker stays open before probing
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Consecutive-failure circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    /// Whether a call may proceed right now
    ///
    /// An open breaker past its cooldown transitions to half-open and
    /// admits exactly one probe.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } => true,
            State::HalfOpen => false,
            State::Open { since } => {
                if since.elapsed() >= self.config.cooldown {
                    *state = State::HalfOpen;
                    tracing::debug!("breaker half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if matches!(*state, State::HalfOpen) {
            tracing::info!("breaker closed after successful probe");
        }
        *state = State::Closed { failures: 0 };
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        *state = match *state {
            State::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    tracing::warn!(failures, "breaker opened");
                    State::Open {
                        since: Instant::now(),
                    }
                } else {
                    State::Closed { failures }
                }
            }
            // A failed probe re-opens with a fresh cooldown
            State::HalfOpen | State::Open { .. } => State::Open {
                since: Instant::now(),
            },
        };
    }

    /// Whether the breaker is currently refusing calls
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), State::Open { .. } | State::HalfOpen)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
