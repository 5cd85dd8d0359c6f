use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};
use serde::Serialize;

use super::ErrorKind;

// Process-wide counters, shared by every controller
static REQUESTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "adaptix_requests_total",
        "The total number of requests executed under a retry policy"
    )
    .unwrap()
});

static ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "adaptix_request_errors_total",
        "Failed attempts by error kind",
        &["kind"]
    )
    .unwrap()
});

static RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("adaptix_retries_total", "The total number of scheduled retries")
        .unwrap()
});

static CIRCUIT_TRIPS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "adaptix_circuit_trips_total",
        "The total number of times a circuit opened"
    )
    .unwrap()
});

static CIRCUIT_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "adaptix_circuit_rejections_total",
        "Requests failed fast by an open circuit"
    )
    .unwrap()
});

#[derive(Default)]
struct MovingAverage {
    samples: u64,
    mean_ms: f64,
}

/// Per-controller counters
#[derive(Default)]
pub struct ResilienceMetrics {
    requests: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    circuit_trips: AtomicU64,
    circuit_rejections: AtomicU64,
    by_kind: DashMap<ErrorKind, u64>,
    retry_delay: Mutex<MovingAverage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_retries: u64,
    pub circuit_trips: u64,
    pub circuit_rejections: u64,
    pub errors_by_kind: BTreeMap<ErrorKind, u64>,
    /// Mean of the cumulative retry wait per completed request
    pub average_retry_delay_ms: f64,
}

impl ResilienceMetrics {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        REQUESTS.inc();
    }

    /// One failed attempt
    pub fn record_failure(&self, kind: ErrorKind) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.count_kind(kind);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        RETRIES.inc();
    }

    pub fn record_trip(&self) {
        self.circuit_trips.fetch_add(1, Ordering::Relaxed);
        CIRCUIT_TRIPS.inc();
    }

    pub fn record_rejection(&self) {
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
        self.count_kind(ErrorKind::CircuitOpen);
        CIRCUIT_REJECTIONS.inc();
    }

    /// Total time a finished request spent waiting between attempts
    pub fn record_retry_delay(&self, total: Duration) {
        let mut average = self
            .retry_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        average.samples += 1;
        let sample = total.as_secs_f64() * 1000.0;
        average.mean_ms += (sample - average.mean_ms) / average.samples as f64;
    }

    fn count_kind(&self, kind: ErrorKind) {
        *self.by_kind.entry(kind).or_insert(0) += 1;
        ERRORS.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let average_retry_delay_ms = self
            .retry_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mean_ms;

        MetricsSnapshot {
            total_requests: self.requests.load(Ordering::Relaxed),
            total_failures: self.failures.load(Ordering::Relaxed),
            total_retries: self.retries.load(Ordering::Relaxed),
            circuit_trips: self.circuit_trips.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            errors_by_kind: self
                .by_kind
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
            average_retry_delay_ms,
        }
    }

    /// Zero the per-controller counters; process-wide counters keep counting.
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.circuit_trips.store(0, Ordering::Relaxed);
        self.circuit_rejections.store(0, Ordering::Relaxed);
        self.by_kind.clear();
        *self
            .retry_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = MovingAverage::default();
    }
}
