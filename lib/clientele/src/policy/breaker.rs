//! Circuit breaker state machine.
//!
//! Tracks consecutive failures per policy instance. After the failure
//! threshold is reached the circuit opens and calls fail fast; once the break
//! duration elapses exactly one half-open trial call is admitted, and its
//! outcome decides whether the circuit closes or re-opens. A trial that never
//! reports an outcome (its future dropped mid-flight) releases the slot after
//! another break duration.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

const CLOSED: u32 = 0;
const OPEN: u32 = 1;
const HALF_OPEN: u32 = 2;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are rejected immediately.
    Open,
    /// Circuit is half-open, a single trial request is in flight.
    HalfOpen,
}

/// Configuration for a circuit breaker policy.
///
/// Hashable so dynamically selected breakers with the same parameters share
/// one failure counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Duration the circuit stays open before admitting a trial call.
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_duration: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker configuration.
    #[must_use]
    pub const fn new(failure_threshold: u32, break_duration: Duration) -> Self {
        Self {
            failure_threshold,
            break_duration,
        }
    }

    /// Set the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the break duration.
    #[must_use]
    pub const fn with_break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }
}

/// Shared mutable breaker state.
///
/// The failure counter is the one piece of mutable shared state in the whole
/// pipeline; every transition happens through a single atomic mutation point.
#[derive(Debug)]
pub(crate) struct BreakerState {
    state: AtomicU32,
    failure_count: AtomicU32,
    /// Timestamp of the last open transition or trial claim (millis since
    /// epoch). Doubles as the half-open admission token.
    opened_at: AtomicU64,
    config: CircuitBreakerConfig,
}

impl BreakerState {
    pub(crate) fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU32::new(CLOSED),
            failure_count: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            config,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        match self.state.load(Ordering::SeqCst) {
            OPEN => CircuitState::Open,
            HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn current_time_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Returns `true` if the call may proceed.
    ///
    /// From the open state, once the break duration has elapsed, exactly one
    /// caller wins the trial slot; racers keep failing fast. The slot is
    /// claimed by swapping the stamp forward, so a trial whose future is
    /// dropped before reporting an outcome (an outer timeout firing, or an
    /// explicit cancel) does not hold the slot forever: after another break
    /// duration the claim itself is stale and the next caller reclaims it.
    pub(crate) fn try_acquire(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open | CircuitState::HalfOpen => {
                let stamp = self.opened_at.load(Ordering::SeqCst);
                let now = Self::current_time_millis();
                let elapsed = Duration::from_millis(now.saturating_sub(stamp));
                if elapsed < self.config.break_duration {
                    return false;
                }

                // The stamp CAS is the single admission point: a racer
                // reloads the fresh stamp and fails the elapsed check.
                if self
                    .opened_at
                    .compare_exchange(stamp, now, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    return false;
                }
                self.state.store(HALF_OPEN, Ordering::SeqCst);
                true
            }
        }
    }

    pub(crate) fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                self.state.store(CLOSED, Ordering::SeqCst);
                self.failure_count.store(0, Ordering::SeqCst);
                tracing::info!("circuit breaker closed after successful trial call");
            }
            CircuitState::Open => {}
        }
    }

    pub(crate) fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.failure_threshold {
                    self.open(count);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!("circuit breaker re-opened after failed trial call");
                self.state.store(OPEN, Ordering::SeqCst);
                self.opened_at
                    .store(Self::current_time_millis(), Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, failures: u32) {
        tracing::warn!(failures, "circuit breaker opened");
        self.state.store(OPEN, Ordering::SeqCst);
        self.opened_at
            .store(Self::current_time_millis(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.break_duration, Duration::from_secs(30));
    }

    #[test]
    fn config_builder() {
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(3)
            .with_break_duration(Duration::from_secs(60));

        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.break_duration, Duration::from_secs(60));
    }

    #[test]
    fn opens_after_threshold_failures() {
        let state = BreakerState::new(CircuitBreakerConfig::new(3, Duration::from_secs(60)));

        state.record_failure();
        state.record_failure();
        assert_eq!(state.state(), CircuitState::Closed);

        state.record_failure();
        assert_eq!(state.state(), CircuitState::Open);
        assert!(!state.try_acquire());
    }

    #[test]
    fn success_resets_failure_count() {
        let state = BreakerState::new(CircuitBreakerConfig::new(2, Duration::from_secs(60)));

        state.record_failure();
        state.record_success();
        state.record_failure();
        assert_eq!(state.state(), CircuitState::Closed);
    }

    #[test]
    fn admits_exactly_one_trial_after_break() {
        let state = BreakerState::new(CircuitBreakerConfig::new(1, Duration::from_millis(40)));

        state.record_failure();
        assert!(!state.try_acquire());

        std::thread::sleep(Duration::from_millis(50));
        // first caller past the break wins the trial slot
        assert!(state.try_acquire());
        assert_eq!(state.state(), CircuitState::HalfOpen);
        // racer is rejected while the trial is in flight
        assert!(!state.try_acquire());
    }

    #[test]
    fn abandoned_trial_slot_is_reclaimed() {
        let state = BreakerState::new(CircuitBreakerConfig::new(1, Duration::from_millis(40)));

        state.record_failure();
        std::thread::sleep(Duration::from_millis(50));
        assert!(state.try_acquire());
        // The trial never reports an outcome; the claim goes stale after
        // another break duration instead of holding the slot forever.
        assert!(!state.try_acquire());

        std::thread::sleep(Duration::from_millis(50));
        assert!(state.try_acquire());
        assert_eq!(state.state(), CircuitState::HalfOpen);

        state.record_success();
        assert_eq!(state.state(), CircuitState::Closed);
    }

    #[test]
    fn trial_outcome_decides_circuit_state() {
        let state = BreakerState::new(CircuitBreakerConfig::new(1, Duration::from_millis(0)));

        state.record_failure();
        assert!(state.try_acquire());
        state.record_failure();
        assert_eq!(state.state(), CircuitState::Open);

        assert!(state.try_acquire());
        state.record_success();
        assert_eq!(state.state(), CircuitState::Closed);
    }
}
