//! In-process list store.
//!
//! Keeps queues in a sharded concurrent map with the same semantics as the
//! Redis adapter: values are pushed onto the head of a list, each push applies
//! the list's expiry, and a missing or expired list has length 0. Useful for
//! tests, benchmarks and single-process deployments.
//!
//! Expired lists are dropped lazily the next time they are touched.

use crate::application::ports::{Clock, ListStore, StoreError, TtlMode};
use crate::domain::envelope::MessageEnvelope;
use crate::infrastructure::clock::SystemClock;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct StoredList {
    /// Head first
    items: VecDeque<Vec<u8>>,
    expires_at: Option<Instant>,
}

impl StoredList {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// List store backed by a [`DashMap`].
pub struct InMemoryListStore {
    lists: DashMap<String, StoredList>,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

impl fmt::Debug for InMemoryListStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryListStore")
            .field("lists", &self.lists.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl InMemoryListStore {
    /// Create an empty store using the system clock for expiry.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create an empty store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            lists: DashMap::new(),
            clock,
            closed: AtomicBool::new(false),
        }
    }

    /// Raw values of list `key`, head first.
    pub fn items(&self, key: &str) -> Vec<Vec<u8>> {
        self.evict_expired(key);
        self.lists
            .get(key)
            .map(|list| list.items.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Envelopes stored in list `key`, head first. Undecodable values are skipped.
    pub fn envelopes(&self, key: &str) -> Vec<MessageEnvelope> {
        self.items(key)
            .iter()
            .filter_map(|raw| MessageEnvelope::from_bytes(raw).ok())
            .collect()
    }

    /// Remove and return the value at the tail of list `key`, as a consumer would.
    pub fn pop_tail(&self, key: &str) -> Option<Vec<u8>> {
        self.evict_expired(key);
        let value = self.lists.get_mut(key)?.items.pop_back();
        self.lists.remove_if(key, |_, list| list.items.is_empty());
        value
    }

    /// Remaining time to live of list `key`, if it exists and has an expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.evict_expired(key);
        let now = self.clock.now();
        self.lists
            .get(key)?
            .expires_at
            .map(|at| at.saturating_duration_since(now))
    }

    /// Check whether [`ListStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn evict_expired(&self, key: &str) {
        let now = self.clock.now();
        self.lists.remove_if(key, |_, list| list.is_expired(now));
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryListStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ListStore for InMemoryListStore {
    async fn push_with_expiry(
        &self,
        key: &str,
        values: Vec<Vec<u8>>,
        ttl: Duration,
        mode: TtlMode,
    ) -> Result<u64, StoreError> {
        self.ensure_open()?;
        if values.is_empty() {
            return Err(StoreError::Server(
                "wrong number of arguments for 'lpush' command".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut list = self.lists.entry(key.to_string()).or_default();
        if list.is_expired(now) {
            *list = StoredList::default();
        }

        for value in values {
            list.items.push_front(value);
        }
        // An expiry past the clock's range never fires
        let expires_at = now.checked_add(ttl);
        match mode {
            TtlMode::Sliding => list.expires_at = expires_at,
            TtlMode::SetIfAbsent if list.expires_at.is_none() => list.expires_at = expires_at,
            TtlMode::SetIfAbsent => {}
        }

        Ok(list.items.len() as u64)
    }

    async fn len(&self, key: &str) -> Result<u64, StoreError> {
        self.ensure_open()?;
        self.evict_expired(key);
        Ok(self
            .lists
            .get(key)
            .map_or(0, |list| list.items.len() as u64))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
