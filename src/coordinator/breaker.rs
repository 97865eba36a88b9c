//! Per-provider circuit breaker.
//!
//! Shields the orchestrator from unhealthy capability providers. Each
//! provider gets its own breaker; every call outcome feeds the state
//! machine.
//!
//! # Circuit Breaker States
//!
//! ```text
//! +--------+     failures >= threshold     +------+
//! | Closed | --------------------------->  | Open |
//! +--------+                               +------+
//!     ^                                        |
//!     |  trial success                         | cooldown elapsed
//!     |                                        v
//!     +--------------------------------  +-----------+
//!                                        | Half-Open |
//!                                        +-----------+
//! ```
//!
//! Half-open admits exactly one trial call, even under concurrent load;
//! further callers are rejected until the trial resolves.

use super::CoordinatorConfig;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Point-in-time view of a breaker, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    Closed {
        /// Consecutive failures recorded so far.
        consecutive_failures: u32,
    },
    /// Calls fail fast until the cooldown elapses.
    Open {
        /// Milliseconds until a trial call would be admitted.
        remaining_cooldown_ms: u64,
    },
    /// A single trial call is in flight.
    HalfOpen,
}

/// Circuit breaker state machine.
#[derive(Debug)]
enum BreakerState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

/// Circuit breaker for a single capability provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_threshold: u32,
    cooldown: Duration,
    provider_id: String,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker for the given provider.
    #[must_use]
    pub fn new(config: &CoordinatorConfig, provider_id: impl Into<String>) -> Self {
        Self {
            state: BreakerState::Closed { failures: 0 },
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_millis(config.cooldown_ms),
            provider_id: provider_id.into(),
        }
    }

    /// Checks if a call is allowed through the circuit breaker.
    ///
    /// Returns `true` if the call should proceed, `false` if rejected.
    /// An open breaker whose cooldown has elapsed transitions to half-open
    /// and admits the caller as the single trial call.
    pub fn allow(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.cooldown {
                    tracing::info!(
                        provider = %self.provider_id,
                        "Circuit breaker admitting trial call"
                    );
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            },
            // Trial already in flight; reject until it resolves.
            BreakerState::HalfOpen => false,
        }
    }

    /// Records a successful call, closing the circuit and resetting the
    /// failure count.
    pub fn on_success(&mut self) {
        if !matches!(self.state, BreakerState::Closed { failures: 0 }) {
            tracing::info!(
                provider = %self.provider_id,
                "Circuit breaker closing after success"
            );
        }
        self.state = BreakerState::Closed { failures: 0 };
    }

    /// Records a failed call, potentially opening the circuit.
    ///
    /// Returns `true` if the circuit just opened (tripped).
    pub fn on_failure(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { ref mut failures } => {
                *failures += 1;
                if *failures >= self.failure_threshold {
                    tracing::warn!(
                        provider = %self.provider_id,
                        failures = *failures,
                        threshold = self.failure_threshold,
                        "Circuit breaker opened after consecutive failures"
                    );
                    self.state = BreakerState::Open {
                        opened_at: Instant::now(),
                    };
                    return true;
                }
            },
            BreakerState::HalfOpen => {
                tracing::warn!(
                    provider = %self.provider_id,
                    "Circuit breaker re-opened after trial failure"
                );
                self.state = BreakerState::Open {
                    opened_at: Instant::now(),
                };
                return true;
            },
            BreakerState::Open { .. } => {},
        }
        false
    }

    /// Reports whether a call routed to this provider could proceed.
    ///
    /// Pure read: never mutates state. An open breaker whose cooldown has
    /// elapsed reads as healthy because a trial call would be admitted.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => opened_at.elapsed() >= self.cooldown,
            BreakerState::HalfOpen => false,
        }
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> CircuitState {
        match self.state {
            BreakerState::Closed { failures } => CircuitState::Closed {
                consecutive_failures: failures,
            },
            BreakerState::Open { opened_at } => {
                let remaining = self.cooldown.saturating_sub(opened_at.elapsed());
                CircuitState::Open {
                    remaining_cooldown_ms: u64::try_from(remaining.as_millis())
                        .unwrap_or(u64::MAX),
                }
            },
            BreakerState::HalfOpen => CircuitState::HalfOpen,
        }
    }

    /// Returns the current state as a numeric value for metrics.
    ///
    /// - 0: Closed
    /// - 1: Open
    /// - 2: Half-Open
    #[must_use]
    pub const fn state_value(&self) -> u8 {
        match self.state {
            BreakerState::Closed { .. } => 0,
            BreakerState::Open { .. } => 1,
            BreakerState::HalfOpen => 2,
        }
    }

    /// Returns the provider this breaker guards.
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, cooldown_ms: u64) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_failure_threshold(threshold)
            .with_cooldown_ms(cooldown_ms)
    }

    #[test]
    fn test_breaker_starts_closed() {
        let breaker = CircuitBreaker::new(&CoordinatorConfig::default(), "planner");
        assert_eq!(breaker.state_value(), 0);
        assert_eq!(
            breaker.snapshot(),
            CircuitState::Closed {
                consecutive_failures: 0
            }
        );
    }

    #[test]
    fn test_breaker_allows_calls_when_closed() {
        let mut breaker = CircuitBreaker::new(&CoordinatorConfig::default(), "planner");
        assert!(breaker.allow());
        assert!(breaker.allow());
        assert!(breaker.allow());
    }

    #[test]
    fn test_breaker_opens_after_threshold_failures() {
        let mut breaker = CircuitBreaker::new(&config(3, 30_000), "planner");

        // First two failures don't trip the breaker
        assert!(!breaker.on_failure());
        assert_eq!(breaker.state_value(), 0);
        assert!(!breaker.on_failure());
        assert_eq!(breaker.state_value(), 0);

        // Third failure trips the breaker
        assert!(breaker.on_failure());
        assert_eq!(breaker.state_value(), 1);
    }

    #[test]
    fn test_breaker_rejects_when_open() {
        let mut breaker = CircuitBreaker::new(&config(1, 60_000), "planner");

        breaker.on_failure();
        assert_eq!(breaker.state_value(), 1);

        assert!(!breaker.allow());
        assert!(!breaker.allow());
    }

    #[test]
    fn test_breaker_half_open_after_cooldown() {
        let mut breaker = CircuitBreaker::new(&config(1, 0), "planner");

        breaker.on_failure();
        assert_eq!(breaker.state_value(), 1);

        std::thread::sleep(Duration::from_millis(1));
        assert!(breaker.allow());
        assert_eq!(breaker.state_value(), 2);
        assert_eq!(breaker.snapshot(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_exactly_one_trial() {
        let mut breaker = CircuitBreaker::new(&config(1, 0), "planner");

        breaker.on_failure();
        std::thread::sleep(Duration::from_millis(1));

        // The transitioning call is the trial; everyone else waits.
        assert!(breaker.allow());
        assert!(!breaker.allow());
        assert!(!breaker.allow());
        assert_eq!(breaker.state_value(), 2);
    }

    #[test]
    fn test_trial_success_closes_breaker() {
        let mut breaker = CircuitBreaker::new(&config(1, 0), "planner");

        breaker.on_failure();
        std::thread::sleep(Duration::from_millis(1));
        assert!(breaker.allow());

        breaker.on_success();
        assert_eq!(breaker.state_value(), 0);
        assert_eq!(
            breaker.snapshot(),
            CircuitState::Closed {
                consecutive_failures: 0
            }
        );
    }

    #[test]
    fn test_trial_failure_reopens_breaker() {
        let mut breaker = CircuitBreaker::new(&config(1, 0), "planner");

        breaker.on_failure();
        std::thread::sleep(Duration::from_millis(1));
        assert!(breaker.allow());
        assert_eq!(breaker.state_value(), 2);

        assert!(breaker.on_failure());
        assert_eq!(breaker.state_value(), 1);
    }

    #[test]
    fn test_failure_count_resets_on_success() {
        let mut breaker = CircuitBreaker::new(&config(3, 30_000), "planner");

        breaker.on_failure();
        breaker.on_failure();
        breaker.on_success();
        assert_eq!(
            breaker.snapshot(),
            CircuitState::Closed {
                consecutive_failures: 0
            }
        );

        // Threshold counts consecutive failures only.
        breaker.on_failure();
        breaker.on_failure();
        assert_eq!(breaker.state_value(), 0);
    }

    #[test]
    fn test_threshold_clamped_to_one() {
        let mut breaker = CircuitBreaker::new(&config(0, 30_000), "planner");
        assert!(breaker.on_failure());
        assert_eq!(breaker.state_value(), 1);
    }

    #[test]
    fn test_is_healthy_reflects_state() {
        let mut breaker = CircuitBreaker::new(&config(1, 60_000), "planner");
        assert!(breaker.is_healthy());

        breaker.on_failure();
        assert!(!breaker.is_healthy());

        // Elapsed cooldown reads as healthy: a trial would be admitted.
        let mut breaker = CircuitBreaker::new(&config(1, 0), "planner");
        breaker.on_failure();
        std::thread::sleep(Duration::from_millis(1));
        assert!(breaker.is_healthy());

        // In-flight trial reads as unhealthy.
        assert!(breaker.allow());
        assert!(!breaker.is_healthy());
    }

    #[test]
    fn test_snapshot_reports_remaining_cooldown() {
        let mut breaker = CircuitBreaker::new(&config(1, 60_000), "planner");
        breaker.on_failure();

        match breaker.snapshot() {
            CircuitState::Open {
                remaining_cooldown_ms,
            } => {
                assert!(remaining_cooldown_ms > 0);
                assert!(remaining_cooldown_ms <= 60_000);
            },
            other => panic!("expected open state, got {other:?}"),
        }
    }

    #[test]
    fn test_provider_id_accessor() {
        let breaker = CircuitBreaker::new(&CoordinatorConfig::default(), "researcher");
        assert_eq!(breaker.provider_id(), "researcher");
    }
}
