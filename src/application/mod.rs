//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the send path and manages its runtime state:
//! - Admission control (token bucket)
//! - Circuit breaker around store calls
//! - Dispatch engine (envelopes, batches, TTLs)
//! - Health tracking
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod admission;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod ports;
