//! Domain layer - pure types with no I/O.
//!
//! This layer contains the core concepts of message dispatch:
//! - Message payloads and the codecs that encode them
//! - Envelopes wrapped around every queued message
//! - Queue key resolution
//! - Health classification
//!
//! All types in this layer are pure and easily testable.

pub mod codec;
pub mod envelope;
pub mod health;
pub mod message;
pub mod queue_key;
pub mod registration;
