//! Integration tests for admission waits, cancellation and shutdown.

mod common;

use common::{config, fixture};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use valkey_dispatch::infrastructure::mocks::FlakyStore;
use valkey_dispatch::{ConnectionState, DispatchError, ListStore, Sender};

#[tokio::test(start_paused = true)]
async fn test_second_call_waits_for_refill() {
    let f = fixture(config(3).with_rate_limit(1.0, 1)).await;
    let cancel = CancellationToken::new();

    f.sender.send_message("jobs", "a", &cancel).await.unwrap();

    let started = Instant::now();
    f.sender.send_message("jobs", "b", &cancel).await.unwrap();
    let waited = started.elapsed();

    assert!(waited >= Duration::from_millis(900), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(1_100), "waited {:?}", waited);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait_returns_promptly() {
    let f = fixture(config(3).with_rate_limit(1.0, 1)).await;
    f.sender
        .send_message("jobs", "a", &CancellationToken::new())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = f.sender.send_message("jobs", "b", &cancel).await.unwrap_err();

    assert!(matches!(err, DispatchError::RateLimited));
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(f.store.inner().items("queue:jobs").len(), 1);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let f = fixture(config(3)).await;
    let cancel = CancellationToken::new();
    f.sender.send_message("jobs", "a", &cancel).await.unwrap();

    f.sender.close().await.unwrap();
    f.sender.close().await.unwrap();

    assert!(f.store.inner().is_closed());
    assert_eq!(
        f.sender.health().connection_state,
        ConnectionState::Disconnected
    );
    assert!(matches!(
        f.sender.send_message("jobs", "b", &cancel).await,
        Err(DispatchError::Closed)
    ));
    assert!(matches!(
        f.sender.queue_size("jobs", &cancel).await,
        Err(DispatchError::Closed)
    ));
}

#[tokio::test]
async fn test_close_drains_in_flight_sends() {
    let store = Arc::new(FlakyStore::new().with_latency(Duration::from_millis(50)));
    let sender = Sender::builder(config(3))
        .with_store(Arc::clone(&store) as Arc<dyn ListStore>)
        .build()
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let sender = sender.clone();
            tokio::spawn(async move {
                sender
                    .send_message("jobs", format!("m{i}"), &CancellationToken::new())
                    .await
            })
        })
        .collect();
    // Let every send reach the store
    tokio::time::sleep(Duration::from_millis(10)).await;

    sender.close().await.unwrap();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    assert_eq!(store.inner().items("queue:jobs").len(), 8);
    assert_eq!(sender.health().messages_sent, 8);
}

#[tokio::test(start_paused = true)]
async fn test_close_wakes_admission_waiters() {
    let f = fixture(config(3).with_rate_limit(0.01, 1)).await;
    let cancel = CancellationToken::new();
    f.sender.send_message("jobs", "a", &cancel).await.unwrap();

    let waiter = {
        let sender = f.sender.clone();
        tokio::spawn(async move {
            sender
                .send_message("jobs", "b", &CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    f.sender.close().await.unwrap();

    assert!(matches!(waiter.await.unwrap(), Err(DispatchError::Closed)));
    assert_eq!(f.store.inner().items("queue:jobs").len(), 1);
}
