//! Request context management
//!
//! This module provides the RequestContext that holds per-request state
//! while the orchestrator moves a call through its adaptation steps.

use tokio::time::Instant;
use uuid::Uuid;

/// Context that holds per-request state and metadata
pub struct RequestContext {
    /// Identifier propagated to the resilience controller and the result
    pub request_id: String,

    /// Start of the request, used for the reported response time
    pub request_start: Instant,

    /// Set once a structured document in the body was converted
    pub conversion_applied: bool,

    /// Set once at least one identifier field was replaced
    pub identifier_resolution_applied: bool,

    warnings: Vec<String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RequestContext {
    /// Create a new context, generating a request id when none is given
    pub fn new(request_id: Option<String>) -> Self {
        Self {
            request_id: request_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            request_start: Instant::now(),
            conversion_applied: false,
            identifier_resolution_applied: false,
            warnings: Vec::new(),
        }
    }

    /// Record a warning that will be returned with the result
    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        log::debug!("request {}: {}", self.request_id, warning);
        self.warnings.push(warning);
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Elapsed wall-clock time since the context was created
    pub fn elapsed_ms(&self) -> u64 {
        self.request_start.elapsed().as_millis() as u64
    }
}
