//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Shortest list expiry a push accepts.
pub const MIN_TTL: Duration = Duration::from_millis(1);

/// Longest list expiry a push accepts. Redis takes `PEXPIRE` in signed
/// milliseconds and rejects anything larger.
pub const MAX_TTL: Duration = Duration::from_millis(i64::MAX as u64);

/// How a push refreshes the expiry of its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtlMode {
    /// Re-arm the expiry on every push, anchoring it to the newest message
    #[default]
    Sliding,
    /// Only set an expiry when the list has none
    SetIfAbsent,
}

/// Errors reported by a list store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The connection could not be established or was lost
    #[error("connection error: {0}")]
    Connection(String),
    /// The store did not answer within the configured timeout
    #[error("operation timed out")]
    Timeout,
    /// The store rejected the command
    #[error("server error: {0}")]
    Server(String),
    /// The caller cancelled before the operation completed
    #[error("operation cancelled")]
    Cancelled,
    /// The store has been closed
    #[error("store is closed")]
    Closed,
}

/// Port for the list data store holding the queues.
///
/// Infrastructure provides concrete implementations (RedisListStore,
/// InMemoryListStore).
#[async_trait]
pub trait ListStore: Send + Sync + Debug {
    /// Push `values` onto the head of list `key`, in order, and apply `ttl`
    /// to the list as one atomic unit.
    ///
    /// Either every value is pushed and the expiry applied, or nothing is.
    ///
    /// # Returns
    /// The list length after the push.
    async fn push_with_expiry(
        &self,
        key: &str,
        values: Vec<Vec<u8>>,
        ttl: Duration,
        mode: TtlMode,
    ) -> Result<u64, StoreError>;

    /// Length of list `key`; a missing key has length 0.
    async fn len(&self, key: &str) -> Result<u64, StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release connections held by the store.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
