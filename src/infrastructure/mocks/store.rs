//! Failure-injecting list store for testing.

use crate::application::ports::{Clock, ListStore, StoreError, TtlMode};
use crate::infrastructure::memory_store::InMemoryListStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory store that can be switched into a failing mode.
///
/// Counts calls per operation and can add latency to every call, which lets
/// tests observe in-flight operations.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryListStore,
    failing: AtomicBool,
    latency: Duration,
    push_calls: AtomicU64,
    len_calls: AtomicU64,
    close_calls: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire lists by `clock` instead of the system clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: InMemoryListStore::with_clock(clock),
            ..Self::default()
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make subsequent calls fail with a connection error, or succeed again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The backing store, for inspecting queue contents.
    pub fn inner(&self) -> &InMemoryListStore {
        &self.inner
    }

    pub fn push_calls(&self) -> u64 {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn len_calls(&self) -> u64 {
        self.len_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u64 {
        self.close_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), StoreError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Connection("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ListStore for FlakyStore {
    async fn push_with_expiry(
        &self,
        key: &str,
        values: Vec<Vec<u8>>,
        ttl: Duration,
        mode: TtlMode,
    ) -> Result<u64, StoreError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.inner.push_with_expiry(key, values, ttl, mode).await
    }

    async fn len(&self, key: &str) -> Result<u64, StoreError> {
        self.len_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.inner.len(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.enter().await?;
        self.inner.ping().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}
