//! Core traits for Adaptix components
//!
//! This module defines the seams through which the adaptation layer talks
//! to the outside world: the HTTP transport, the credential source and the
//! observer that receives resilience events.

use std::time::Duration;

use async_trait::async_trait;
use http::HeaderValue;

use crate::resilience::ResilienceEvent;
use crate::transport::{TransportError, TransportRequest, TransportResponse};

/// Trait for the concrete HTTP call against the backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a single request; `timeout` bounds the whole exchange.
    ///
    /// Any HTTP status is a successful exchange. Only failures to obtain a
    /// response at all are reported as errors.
    async fn send(
        &self,
        request: TransportRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

/// Trait for the source of the authorization header
pub trait CredentialProvider: Send + Sync {
    /// Value for the `Authorization` header, or `None` for anonymous access
    fn authorization(&self) -> Option<HeaderValue>;
}

/// Trait for receiving retry and circuit breaker events
pub trait ResilienceObserver: Send + Sync {
    fn on_event(&self, event: &ResilienceEvent);
}

/// Observer that drops every event
pub struct NoopObserver;

impl ResilienceObserver for NoopObserver {
    fn on_event(&self, _event: &ResilienceEvent) {}
}
