//! Health tracking for a sender.
//!
//! Counters are updated from every concurrent call and read at any time to
//! build a [`HealthStatus`] report.

use crate::application::circuit_breaker::CircuitState;
use crate::domain::health::{ConnectionState, HealthLevel, HealthStatus};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe health counters.
///
/// Counters use atomic operations; the last success time and last error
/// text sit behind a lock. Clones share the same state.
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    inner: Arc<HealthInner>,
}

#[derive(Debug)]
struct HealthInner {
    /// Messages written successfully
    messages_sent: AtomicU64,
    /// Failed calls
    error_count: AtomicU64,
    /// Whether the last store call succeeded
    connected: AtomicBool,
    started_at: Instant,
    last: RwLock<LastOutcome>,
}

#[derive(Debug, Default)]
struct LastOutcome {
    success: Option<DateTime<Utc>>,
    error: Option<(DateTime<Utc>, String)>,
}

impl HealthAggregator {
    /// Create a tracker with zeroed counters, starting the uptime clock.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HealthInner {
                messages_sent: AtomicU64::new(0),
                error_count: AtomicU64::new(0),
                connected: AtomicBool::new(false),
                started_at: Instant::now(),
                last: RwLock::new(LastOutcome::default()),
            }),
        }
    }

    /// Record `count` messages written in one call.
    pub fn record_success(&self, count: u64) {
        self.inner.messages_sent.fetch_add(count, Ordering::Relaxed);
        self.inner.last.write().success = Some(Utc::now());
    }

    /// Record one failed call.
    pub fn record_failure(&self, message: impl Into<String>) {
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
        self.inner.last.write().error = Some((Utc::now(), message.into()));
    }

    /// Update the store connection flag.
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::Release);
    }

    /// Check the store connection flag.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Get the total number of messages sent.
    pub fn messages_sent(&self) -> u64 {
        self.inner.messages_sent.load(Ordering::Relaxed)
    }

    /// Get the total number of failed calls.
    pub fn error_count(&self) -> u64 {
        self.inner.error_count.load(Ordering::Relaxed)
    }

    /// Build a report, classifying health from the current counters.
    pub fn snapshot(&self, breaker: CircuitState) -> HealthStatus {
        let messages_sent = self.messages_sent();
        let error_count = self.error_count();
        let (last_success, last_error_at, last_error) = {
            let last = self.inner.last.read();
            let (error_at, error) = last.error.clone().unzip();
            (last.success, error_at, error)
        };

        HealthStatus {
            status: HealthLevel::from_counts(messages_sent, error_count),
            messages_sent,
            error_count,
            error_rate: HealthLevel::error_rate(messages_sent, error_count),
            last_success,
            last_error,
            last_error_at,
            uptime: self.inner.started_at.elapsed(),
            connection_state: if self.is_connected() {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            },
            circuit_breaker: breaker.as_str().to_string(),
        }
    }
}

impl Default for HealthAggregator {
    fn default() -> Self {
        Self::new()
    }
}
