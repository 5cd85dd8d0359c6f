//! Request orchestration layer
//!
//! This module coordinates the converter, the identifier resolver, the
//! revision negotiator and the resilience controller for one backend call.

pub mod executor;
pub mod router;

pub use executor::{RequestExecutor, RequestOptions, RequestResult};
pub use router::EndpointRouter;
