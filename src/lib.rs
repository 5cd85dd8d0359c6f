//! Adaptix sits between callers and a REST backend that speaks a slightly
//! different dialect than they were written for.
//!
//! It converts rich text documents to wiki markup, resolves user
//! identifiers, negotiates the API revision and runs every call under a
//! retry policy and circuit breaker. [`client::AdaptationClient`] is the
//! entry point.

pub mod client;
pub mod config;
pub mod convert;
pub mod core;
pub mod identity;
pub mod logging;
pub mod orchestration;
pub mod resilience;
pub mod revision;
pub mod transport;
pub(crate) mod utils;

pub use client::AdaptationClient;
