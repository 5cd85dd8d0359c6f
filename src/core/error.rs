//! Unified error handling for Adaptix
//!
//! This module provides the crate-wide error type. Failures that went
//! through the resilience controller arrive here already classified as a
//! [`RequestError`]; everything else is a configuration, transport or
//! internal problem.

use std::fmt;

use crate::resilience::RequestError;
use crate::transport::TransportError;

/// Unified error types for the adaptation layer
#[derive(Debug)]
pub enum AdaptError {
    /// Configuration-related errors, including rejected endpoints
    Configuration(String),

    /// Classified failure of a request executed under the retry policy
    Request(RequestError),

    /// Transport failures outside of the resilience controller
    Transport(TransportError),

    /// JSON (de)serialization errors
    Serialization(serde_json::Error),

    /// Internal system errors
    Internal(String),
}

impl fmt::Display for AdaptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdaptError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            AdaptError::Request(err) => write!(f, "Request failed: {err}"),
            AdaptError::Transport(err) => write!(f, "Transport error: {err}"),
            AdaptError::Serialization(err) => write!(f, "Serialization error: {err}"),
            AdaptError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for AdaptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AdaptError::Request(err) => Some(err),
            AdaptError::Transport(err) => Some(err),
            AdaptError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

// Error conversions
impl From<RequestError> for AdaptError {
    fn from(err: RequestError) -> Self {
        AdaptError::Request(err)
    }
}

impl From<TransportError> for AdaptError {
    fn from(err: TransportError) -> Self {
        AdaptError::Transport(err)
    }
}

impl From<serde_json::Error> for AdaptError {
    fn from(err: serde_json::Error) -> Self {
        AdaptError::Serialization(err)
    }
}

impl AdaptError {
    /// The classified request error, if this failure went through the retry loop
    pub fn as_request_error(&self) -> Option<&RequestError> {
        match self {
            AdaptError::Request(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for adaptation operations
pub type AdaptResult<T> = std::result::Result<T, AdaptError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> AdaptResult<T>;

    fn config_context(self, context: &str) -> AdaptResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> AdaptResult<T> {
        self.map_err(|e| AdaptError::Internal(format!("{context}: {e}")))
    }

    fn config_context(self, context: &str) -> AdaptResult<T> {
        self.map_err(|e| AdaptError::Configuration(format!("{context}: {e}")))
    }
}

/// Shorthand for a configuration error
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::core::error::AdaptError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::AdaptError::Configuration(format!($fmt, $($arg)*))
    };
}
