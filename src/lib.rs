//! # valkey-dispatch
//!
//! Resilient message dispatch into Valkey/Redis list queues.
//!
//! Every send passes through a token-bucket admission gate and a circuit
//! breaker before reaching the store as one atomic push-and-expire operation.
//! Outcomes feed a health report and optional observers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use valkey_dispatch::{init_logging, Sender, SenderConfig};
//! use tokio_util::sync::CancellationToken;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! // Reads VALKEY_SENDER_* variables, falling back to defaults
//! let config = SenderConfig::from_env()?;
//! init_logging(config.log_level())?;
//!
//! let sender = Sender::builder(config)
//!     .on_error(|err| tracing::warn!(error = %err, "send failed"))
//!     .build()
//!     .await?;
//!
//! let cancel = CancellationToken::new();
//! sender.send_message("orders", json!({"order_id": 7}), &cancel).await?;
//! println!("{} orders waiting", sender.queue_size("orders", &cancel).await?);
//!
//! sender.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! ### Send Path
//! - **Admission control**: token bucket with a configurable rate and burst;
//!   waiters are served in arrival order and give up when cancelled
//! - **Circuit breaker**: opens after consecutive store failures, probes with
//!   a limited number of trial calls once its open period ends
//! - **Atomic batches**: all messages of a batch are written in one
//!   operation, or none is
//! - **Queue expiry**: every push refreshes the queue TTL (sliding), or only
//!   sets it when the queue has none (`TtlMode::SetIfAbsent`)
//!
//! ### Other Features
//! - **Envelopes**: each payload is wrapped with an id, timestamps, TTL and
//!   content-type header
//! - **Pluggable codecs and queue naming**: JSON codec and `queue:` prefix
//!   by default
//! - **Health reporting**: counters, error rate, connection flag and breaker
//!   state
//! - **Observers**: per-message success, per-call error and breaker
//!   state-change callbacks
//!
//! ## Queues and Envelopes
//!
//! A queue named `orders` is stored under the key `queue:orders`. Messages are
//! pushed at the head of the list; consumers pop from the tail, so a batch
//! comes out in the order it was submitted.
//!
//! ```text
//! head                                   tail
//! [ batch[2] | batch[1] | batch[0] | older ... ]
//! ```
//!
//! Each list item is a JSON envelope:
//!
//! ```text
//! {
//!   "id": "4f1c...",
//!   "queue": "orders",
//!   "payload": "eyJvcmRlcl9pZCI6N30=",
//!   "headers": { "content-type": "application/json" },
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "ttl": 86400000000000,
//!   "retries": 0
//! }
//! ```
//!
//! ## Failure Handling
//!
//! Sends are never retried internally. A failed call returns a
//! [`DispatchError`] describing which stage refused it:
//!
//! | Error | Cause |
//! |-------|-------|
//! | `RateLimited` | cancelled while waiting for admission |
//! | `CircuitOpen` | breaker open, or half-open with its trial quota in use |
//! | `EmptyBatch` | batch send without messages |
//! | `InvalidTtl` | per-call TTL below 1ms or above `MAX_TTL` |
//! | `Serialization` | codec rejected the payload |
//! | `Transport` | the store call failed |
//! | `Closed` | the sender has been closed |
//!
//! Every failed send is counted once in the health report and passed once to
//! the error observer.
//!
//! ## Shutdown
//!
//! [`Sender::close`] stops admitting new calls, waits for in-flight calls and
//! releases the store connection. Calling it again is a no-op.

// Domain layer - pure message types
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

pub use domain::{
    codec::{CodecError, JsonCodec, MessageCodec},
    envelope::{MessageEnvelope, MessageMetadata},
    health::{ConnectionState, HealthLevel, HealthStatus},
    message::{Message, PayloadShape},
    queue_key::{FnResolver, PrefixResolver, QueueKeyResolver},
    registration::UserRegistration,
};

pub use application::{
    admission::{AdmissionConfigError, AdmissionController, AdmissionError},
    circuit_breaker::{
        BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState, Counts, StateChange,
    },
    dispatcher::{DispatchEngine, DispatchSettings},
    error::DispatchError,
    health::HealthAggregator,
    ports::{Clock, ListStore, StoreError, TtlMode, MAX_TTL, MIN_TTL},
};

pub use infrastructure::{
    clock::SystemClock,
    config::{parse_duration, ConfigError, SenderConfig, TlsConfig},
    logging::{init_logging, LoggingError},
    memory_store::InMemoryListStore,
    sender::{Sender, SenderBuilder, SenderError},
};

#[cfg(feature = "redis-store")]
pub use infrastructure::redis_store::{redis_url, RedisListStore};
