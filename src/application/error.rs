//! Errors returned by dispatch operations.

use crate::application::admission::AdmissionError;
use crate::application::circuit_breaker::{BreakerError, CircuitState};
use crate::application::ports::StoreError;
use crate::domain::codec::CodecError;
use std::time::Duration;
use thiserror::Error;

/// Error returned by a send or queue-size call.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Cancelled while waiting for admission
    #[error("rate limited")]
    RateLimited,

    /// The circuit breaker refused the call
    #[error("circuit breaker is {state}")]
    CircuitOpen { state: CircuitState },

    /// A batch send was called with no messages
    #[error("batch cannot be empty")]
    EmptyBatch,

    /// The requested expiry is outside `MIN_TTL..=MAX_TTL`
    #[error("invalid message TTL {0:?}")]
    InvalidTtl(Duration),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The store call failed
    #[error("failed to access queue '{queue}': {source}")]
    Transport {
        queue: String,
        #[source]
        source: StoreError,
    },

    /// The sender has been closed
    #[error("sender is closed")]
    Closed,
}

impl DispatchError {
    /// Check whether the error came from the store itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, DispatchError::Transport { .. })
    }

    pub(crate) fn from_breaker(queue: &str, err: BreakerError<StoreError>) -> Self {
        match err {
            BreakerError::Open => DispatchError::CircuitOpen {
                state: CircuitState::Open,
            },
            BreakerError::TooManyRequests => DispatchError::CircuitOpen {
                state: CircuitState::HalfOpen,
            },
            BreakerError::Operation(source) => DispatchError::Transport {
                queue: queue.to_string(),
                source,
            },
        }
    }
}

impl From<AdmissionError> for DispatchError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::RateLimited => DispatchError::RateLimited,
            AdmissionError::Closed => DispatchError::Closed,
        }
    }
}

impl From<CodecError> for DispatchError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Serialization(msg) => DispatchError::Serialization(msg),
            CodecError::Deserialization(msg) => DispatchError::Deserialization(msg),
        }
    }
}
