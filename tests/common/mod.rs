//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};
use valkey_dispatch::infrastructure::mocks::{FlakyStore, MockClock};
use valkey_dispatch::{CircuitBreakerConfig, ListStore, Sender, SenderBuilder, SenderConfig};

/// Configuration with a generous rate limit and a breaker that trips after
/// `threshold + 1` consecutive failures.
pub fn config(threshold: u32) -> SenderConfig {
    SenderConfig::default()
        .with_rate_limit(10_000.0, 10_000)
        .with_breaker(CircuitBreakerConfig {
            max_requests: 2,
            interval: Duration::ZERO,
            timeout: Duration::from_secs(30),
            failure_threshold: threshold,
        })
}

/// Store and breaker sharing one mock clock.
pub fn clocked_store() -> (Arc<FlakyStore>, MockClock) {
    let clock = MockClock::new(Instant::now());
    let store = Arc::new(FlakyStore::with_clock(Arc::new(clock.clone())));
    (store, clock)
}

pub struct Fixture {
    pub sender: Sender,
    pub store: Arc<FlakyStore>,
    pub clock: MockClock,
}

/// Sender over a fresh in-memory store driven by a mock clock.
pub async fn fixture(config: SenderConfig) -> Fixture {
    fixture_with(config, |builder| builder).await
}

pub async fn fixture_with(
    config: SenderConfig,
    customise: impl FnOnce(SenderBuilder) -> SenderBuilder,
) -> Fixture {
    let (store, clock) = clocked_store();
    let builder = Sender::builder(config)
        .with_store(Arc::clone(&store) as Arc<dyn ListStore>)
        .with_clock(Arc::new(clock.clone()));
    let sender = customise(builder)
        .build()
        .await
        .expect("sender should build over an in-memory store");

    Fixture {
        sender,
        store,
        clock,
    }
}
