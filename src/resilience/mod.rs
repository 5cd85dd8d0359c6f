//! Error classification, retry and circuit breaking around backend calls.
//!
//! [`ResilienceController::execute`] wraps one logical request: every
//! attempt runs under a timeout, failures are classified into an
//! [`ErrorRecord`], retryable ones are retried with the configured backoff,
//! and every outcome feeds the shared circuit breaker.

pub mod circuit;
pub mod classify;
pub mod metrics;
pub mod policy;

use std::{
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime},
};

use serde::Serialize;

use crate::core::ResilienceObserver;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStatus, Transition};
pub use classify::{classify, Failure};
pub use metrics::{MetricsSnapshot, ResilienceMetrics};
pub use policy::{RetryPolicy, RetryStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimited,
    Server,
    Authentication,
    Authorization,
    NotFound,
    Validation,
    CircuitOpen,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::Server
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Server => "server",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one failed attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub status_code: Option<u16>,
    pub retryable: bool,
    pub retry_after_seconds: Option<u64>,
    pub endpoint: Option<String>,
    pub timestamp: SystemTime,
}

impl ErrorRecord {
    pub fn new(
        kind: ErrorKind,
        status_code: Option<u16>,
        retry_after_seconds: Option<u64>,
        endpoint: Option<&str>,
    ) -> Self {
        Self {
            kind,
            status_code,
            retryable: kind.is_retryable(),
            retry_after_seconds,
            endpoint: endpoint.map(str::to_string),
            timestamp: SystemTime::now(),
        }
    }
}

/// Final failure of a request executed under the retry policy
#[derive(Debug, Clone)]
pub struct RequestError {
    pub record: ErrorRecord,
    pub request_id: Option<String>,
    /// Attempts actually sent to the backend
    pub attempts: u32,
    pub message: String,
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        self.record.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.record.status_code
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error after {} attempt(s): {}",
            self.record.kind, self.attempts, self.message
        )
    }
}

impl std::error::Error for RequestError {}

/// Notifications emitted to the [`ResilienceObserver`]
#[derive(Debug, Clone)]
pub enum ResilienceEvent {
    RetryScheduled {
        request_id: Option<String>,
        attempt: u32,
        delay: Duration,
        kind: ErrorKind,
    },
    CircuitTransition(Transition),
    CircuitRejected {
        request_id: Option<String>,
        retry_in: Duration,
    },
    Exhausted {
        request_id: Option<String>,
        attempts: u32,
        kind: ErrorKind,
    },
}

/// Decides, after a retryable failure, whether to try again
pub type RetryPredicate = Arc<dyn Fn(&ErrorRecord, u32) -> bool + Send + Sync>;

pub struct ResilienceController {
    policy: RetryPolicy,
    attempt_timeout: Duration,
    breaker: CircuitBreaker,
    metrics: ResilienceMetrics,
    observer: Arc<dyn ResilienceObserver>,
    retry_predicate: Option<RetryPredicate>,
}

impl ResilienceController {
    pub fn new(
        policy: RetryPolicy,
        breaker: CircuitBreakerConfig,
        attempt_timeout: Duration,
        observer: Arc<dyn ResilienceObserver>,
    ) -> Self {
        Self {
            policy,
            attempt_timeout,
            breaker: CircuitBreaker::new(breaker),
            metrics: ResilienceMetrics::default(),
            observer,
            retry_predicate: None,
        }
    }

    pub fn with_retry_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Run `operation` until it succeeds, fails terminally, or the circuit
    /// refuses it.
    pub async fn execute<T, F, Fut>(
        &self,
        mut operation: F,
        endpoint: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        self.metrics.record_request();
        let max_attempts = self.policy.max_retries + 1;
        let mut waited = Duration::ZERO;
        let mut attempt = 0;

        loop {
            let permit = match self.breaker.admit() {
                Ok((permit, transition)) => {
                    self.on_transition(transition);
                    permit
                }
                Err(retry_in) => {
                    self.metrics.record_rejection();
                    self.metrics.record_retry_delay(waited);
                    self.observer.on_event(&ResilienceEvent::CircuitRejected {
                        request_id: request_id.map(str::to_string),
                        retry_in,
                    });
                    return Err(RequestError {
                        record: ErrorRecord::new(ErrorKind::CircuitOpen, None, None, endpoint),
                        request_id: request_id.map(str::to_string),
                        attempts: attempt,
                        message: format!(
                            "circuit open, next attempt allowed in {}ms",
                            retry_in.as_millis()
                        ),
                    });
                }
            };
            attempt += 1;

            let outcome = match tokio::time::timeout(self.attempt_timeout, operation()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Failure::Timeout(self.attempt_timeout)),
            };

            let failure = match outcome {
                Ok(value) => {
                    self.on_transition(permit.succeed());
                    self.metrics.record_retry_delay(waited);
                    return Ok(value);
                }
                Err(failure) => {
                    self.on_transition(permit.fail());
                    failure
                }
            };

            let record = classify(&failure, endpoint);
            self.metrics.record_failure(record.kind);

            let retry_allowed = self
                .retry_predicate
                .as_ref()
                .map_or(true, |predicate| predicate(&record, attempt));
            if !record.retryable || attempt >= max_attempts || !retry_allowed {
                log::warn!(
                    "Request {} to {} failed after {attempt} attempt(s): {failure}",
                    request_id.unwrap_or("-"),
                    endpoint.unwrap_or("-"),
                );
                self.metrics.record_retry_delay(waited);
                self.observer.on_event(&ResilienceEvent::Exhausted {
                    request_id: request_id.map(str::to_string),
                    attempts: attempt,
                    kind: record.kind,
                });
                return Err(RequestError {
                    record,
                    request_id: request_id.map(str::to_string),
                    attempts: attempt,
                    message: failure.to_string(),
                });
            }

            let delay = self.policy.next_delay(attempt, &record);
            self.metrics.record_retry();
            self.observer.on_event(&ResilienceEvent::RetryScheduled {
                request_id: request_id.map(str::to_string),
                attempt,
                delay,
                kind: record.kind,
            });
            waited += delay;
            tokio::time::sleep(delay).await;
        }
    }

    fn on_transition(&self, transition: Option<Transition>) {
        let Some(transition) = transition else {
            return;
        };
        if transition.to == CircuitState::Open {
            self.metrics.record_trip();
        }
        self.observer
            .on_event(&ResilienceEvent::CircuitTransition(transition));
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn circuit_status(&self) -> CircuitStatus {
        self.breaker.status()
    }

    pub fn reset_circuit(&self) {
        self.breaker.reset();
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }
}
