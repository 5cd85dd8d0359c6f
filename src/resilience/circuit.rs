use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CircuitBreakerConfig {
    #[serde(default = "CircuitBreakerConfig::default_failure_threshold")]
    #[validate(range(min = 1))]
    pub failure_threshold: u32,
    #[serde(default = "CircuitBreakerConfig::default_success_threshold")]
    #[validate(range(min = 1))]
    pub success_threshold: u32,
    #[serde(default = "CircuitBreakerConfig::default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_failure_threshold(),
            success_threshold: Self::default_success_threshold(),
            recovery_timeout_ms: Self::default_recovery_timeout_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    fn default_failure_threshold() -> u32 {
        5
    }

    fn default_success_threshold() -> u32 {
        2
    }

    fn default_recovery_timeout_ms() -> u64 {
        30_000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Point-in-time view of the breaker
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Time left before an open circuit admits a probe
    pub retry_in_ms: Option<u64>,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    next_attempt_at: Option<Instant>,
    probe_in_flight: bool,
}

impl Inner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            next_attempt_at: None,
            probe_in_flight: false,
        }
    }
}

/// Consecutive-failure circuit breaker shared by every caller of a controller
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::closed()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask to run one attempt.
    ///
    /// Returns the permit and the transition the admission caused, or the
    /// time left before the circuit may be probed.
    pub fn admit(&self) -> Result<(Permit<'_>, Option<Transition>), Duration> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => Ok((Permit::new(self, false), None)),
            CircuitState::Open => {
                let next_attempt_at = inner.next_attempt_at.unwrap_or(now);
                if now < next_attempt_at {
                    return Err(next_attempt_at - now);
                }
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 0;
                inner.probe_in_flight = true;
                Ok((
                    Permit::new(self, true),
                    Some(Transition {
                        from: CircuitState::Open,
                        to: CircuitState::HalfOpen,
                    }),
                ))
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(Duration::ZERO);
                }
                inner.probe_in_flight = true;
                Ok((Permit::new(self, true), None))
            }
        }
    }

    fn trip(&self, inner: &mut Inner) {
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.next_attempt_at =
            Some(Instant::now() + Duration::from_millis(self.config.recovery_timeout_ms));
    }

    fn record_success(&self, probe: bool) -> Option<Transition> {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                None
            }
            CircuitState::HalfOpen if probe => {
                inner.success_count += 1;
                if inner.success_count < self.config.success_threshold {
                    return None;
                }
                *inner = Inner::closed();
                Some(Transition {
                    from: CircuitState::HalfOpen,
                    to: CircuitState::Closed,
                })
            }
            // late results of attempts admitted before the circuit opened
            _ => None,
        }
    }

    fn record_failure(&self, probe: bool) -> Option<Transition> {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
        }
        inner.failure_count += 1;

        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                self.trip(&mut inner);
                Some(Transition {
                    from: CircuitState::Closed,
                    to: CircuitState::Open,
                })
            }
            CircuitState::HalfOpen => {
                self.trip(&mut inner);
                Some(Transition {
                    from: CircuitState::HalfOpen,
                    to: CircuitState::Open,
                })
            }
            _ => None,
        }
    }

    fn release_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    pub fn status(&self) -> CircuitStatus {
        let inner = self.lock();
        let retry_in_ms = match (inner.state, inner.next_attempt_at) {
            (CircuitState::Open, Some(at)) => {
                Some(at.saturating_duration_since(Instant::now()).as_millis() as u64)
            }
            _ => None,
        };

        CircuitStatus {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            retry_in_ms,
        }
    }

    pub fn reset(&self) {
        *self.lock() = Inner::closed();
    }
}

/// Admission to run one attempt; report its outcome with `succeed` or `fail`.
///
/// Dropping an unsettled half-open permit frees the probe slot without
/// counting an outcome.
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) -> Option<Transition> {
        self.settled = true;
        self.breaker.record_success(self.probe)
    }

    pub fn fail(mut self) -> Option<Transition> {
        self.settled = true;
        self.breaker.record_failure(self.probe)
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}
