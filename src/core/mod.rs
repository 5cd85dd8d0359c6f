//! Core abstractions and interfaces for Adaptix
//!
//! This module provides the foundational traits, types, and utilities
//! shared by the converter, the resilience controller, the resolver, the
//! negotiator and the orchestrator.

pub mod context;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use context::RequestContext;
pub use error::{AdaptError, AdaptResult, ErrorContext};
pub use traits::*;
pub use types::Confidence;
