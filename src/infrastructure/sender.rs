//! Public sender façade.
//!
//! A [`Sender`] wires a validated [`SenderConfig`] to a dispatch engine:
//! token-bucket admission, a circuit breaker around the store, the queue key
//! resolver, the payload codec and the observers. It is cheap to clone; all
//! clones share one engine.
//!
//! ## Example
//!
//! ```rust,no_run
//! use valkey_dispatch::{Sender, SenderConfig};
//! use tokio_util::sync::CancellationToken;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SenderConfig::from_env()?;
//! let sender = Sender::builder(config)
//!     .on_error(|err| eprintln!("send failed: {err}"))
//!     .build()
//!     .await?;
//!
//! let cancel = CancellationToken::new();
//! sender.send_message("orders", json!({"id": 7}), &cancel).await?;
//! sender.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::application::admission::{AdmissionConfigError, AdmissionController};
use crate::application::circuit_breaker::{CircuitBreaker, StateChange};
use crate::application::dispatcher::{DispatchEngine, DispatchSettings};
use crate::application::error::DispatchError;
use crate::application::ports::{Clock, ListStore, StoreError};
use crate::domain::codec::MessageCodec;
use crate::domain::envelope::MessageMetadata;
use crate::domain::health::HealthStatus;
use crate::domain::message::Message;
use crate::domain::queue_key::{FnResolver, QueueKeyResolver};
use crate::domain::registration::UserRegistration;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::{ConfigError, SenderConfig};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error returned when building a [`Sender`] fails.
#[derive(Debug, Clone, Error)]
pub enum SenderError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid rate limit: {0}")]
    Admission(#[from] AdmissionConfigError),

    /// The store could not be reached at construction time
    #[error("failed to connect to store: {0}")]
    Connection(#[source] StoreError),

    /// No store was injected and the Redis adapter is not compiled in
    #[error("no list store configured")]
    MissingStore,
}

type ErrorObserver = Arc<dyn Fn(&DispatchError) + Send + Sync>;
type SuccessObserver = Arc<dyn Fn(&MessageMetadata) + Send + Sync>;
type StateObserver = Arc<dyn Fn(StateChange) + Send + Sync>;

/// Builder for [`Sender`].
pub struct SenderBuilder {
    config: SenderConfig,
    store: Option<Arc<dyn ListStore>>,
    clock: Option<Arc<dyn Clock>>,
    resolver: Option<Arc<dyn QueueKeyResolver>>,
    codec: Option<Arc<dyn MessageCodec>>,
    on_error: Option<ErrorObserver>,
    on_success: Option<SuccessObserver>,
    on_state_change: Option<StateObserver>,
}

impl fmt::Debug for SenderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderBuilder")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("resolver", &self.resolver)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl SenderBuilder {
    /// Use `store` instead of connecting to the configured server.
    pub fn with_store(mut self, store: Arc<dyn ListStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Time source for the circuit breaker.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_queue_resolver(mut self, resolver: Arc<dyn QueueKeyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Derive store keys from queue names with `namer`.
    ///
    /// ```rust,no_run
    /// # use valkey_dispatch::{Sender, SenderConfig};
    /// let builder = Sender::builder(SenderConfig::default())
    ///     .with_queue_namer(|queue| format!("tenant-a:{queue}"));
    /// ```
    pub fn with_queue_namer<F>(self, namer: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.with_queue_resolver(Arc::new(FnResolver(namer)))
    }

    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Called once for every failed send call.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Called once for every message written.
    pub fn on_success<F>(mut self, handler: F) -> Self
    where
        F: Fn(&MessageMetadata) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(handler));
        self
    }

    /// Called on every circuit breaker transition.
    pub fn on_state_change<F>(mut self, handler: F) -> Self
    where
        F: Fn(StateChange) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(handler));
        self
    }

    /// Validate the configuration, connect and ping the store.
    ///
    /// # Errors
    /// * `SenderError::Config` if the configuration is invalid
    /// * `SenderError::Connection` if the store cannot be reached
    /// * `SenderError::MissingStore` if no store was injected and the
    ///   `redis-store` feature is disabled
    pub async fn build(self) -> Result<Sender, SenderError> {
        self.config.validate()?;

        let admission =
            AdmissionController::new(self.config.rate_limit_requests, self.config.rate_limit_burst)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let mut breaker = CircuitBreaker::new(self.config.breaker.clone(), clock);
        if let Some(hook) = self.on_state_change {
            breaker = breaker.with_state_change_hook(hook);
        }

        let store = match self.store {
            Some(store) => store,
            None => connect_store(&self.config).await?,
        };

        let mut engine = DispatchEngine::new(store, admission, breaker).with_settings(
            DispatchSettings {
                default_ttl: self.config.message_ttl,
                ttl_mode: self.config.ttl_mode,
            },
        );
        if let Some(resolver) = self.resolver {
            engine = engine.with_resolver(resolver);
        }
        if let Some(codec) = self.codec {
            engine = engine.with_codec(codec);
        }
        if let Some(handler) = self.on_success {
            engine = engine.with_success_handler(handler);
        }
        if let Some(handler) = self.on_error {
            engine = engine.with_error_handler(handler);
        }

        if let Err(err) = engine.ping().await {
            // Close errors are logged by the engine
            let _ = engine.close().await;
            return Err(SenderError::Connection(err));
        }

        tracing::info!(
            address = %self.config.address,
            database = self.config.database,
            default_queue = %self.config.default_queue,
            "sender initialised"
        );

        Ok(Sender {
            engine: Arc::new(engine),
            config: Arc::new(self.config),
        })
    }
}

#[cfg(feature = "redis-store")]
async fn connect_store(config: &SenderConfig) -> Result<Arc<dyn ListStore>, SenderError> {
    let store = crate::infrastructure::redis_store::RedisListStore::connect(config)
        .await
        .map_err(SenderError::Connection)?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-store"))]
async fn connect_store(_config: &SenderConfig) -> Result<Arc<dyn ListStore>, SenderError> {
    Err(SenderError::MissingStore)
}

/// Handle for sending messages to list queues.
#[derive(Clone)]
pub struct Sender {
    engine: Arc<DispatchEngine>,
    config: Arc<SenderConfig>,
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("engine", &self.engine)
            .field("default_queue", &self.config.default_queue)
            .finish_non_exhaustive()
    }
}

impl Sender {
    pub fn builder(config: SenderConfig) -> SenderBuilder {
        SenderBuilder {
            config,
            store: None,
            clock: None,
            resolver: None,
            codec: None,
            on_error: None,
            on_success: None,
            on_state_change: None,
        }
    }

    /// Build a sender with no custom handlers.
    ///
    /// # Errors
    /// See [`SenderBuilder::build`].
    pub async fn connect(config: SenderConfig) -> Result<Self, SenderError> {
        Self::builder(config).build().await
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Codec used for payloads, also usable to decode them.
    pub fn codec(&self) -> &dyn MessageCodec {
        self.engine.codec()
    }

    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    /// Send one message with the configured TTL.
    ///
    /// An empty `queue` names the configured default queue.
    ///
    /// # Errors
    /// Returns `DispatchError` if the message was not written.
    pub async fn send_message(
        &self,
        queue: &str,
        message: impl Into<Message>,
        cancel: &CancellationToken,
    ) -> Result<MessageMetadata, DispatchError> {
        self.send_message_with_ttl(queue, message, self.config.message_ttl, cancel)
            .await
    }

    /// Send one message and set the queue expiry to `ttl`.
    ///
    /// A zero `ttl` is replaced by the configured TTL.
    ///
    /// # Errors
    /// Returns `DispatchError::InvalidTtl` if `ttl` is under 1ms or above
    /// [`MAX_TTL`](crate::MAX_TTL), and otherwise any `DispatchError` of
    /// [`send_message`](Self::send_message).
    pub async fn send_message_with_ttl(
        &self,
        queue: &str,
        message: impl Into<Message>,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<MessageMetadata, DispatchError> {
        let ttl = if ttl.is_zero() {
            self.config.message_ttl
        } else {
            ttl
        };
        self.engine
            .send_one(self.queue(queue), &message.into(), ttl, cancel)
            .await
    }

    /// Send all `messages` in one atomic write with the configured TTL.
    ///
    /// # Errors
    /// Returns `DispatchError::EmptyBatch` for an empty slice, or any error
    /// of [`send_message`](Self::send_message). Nothing is written on error.
    pub async fn send_batch(
        &self,
        queue: &str,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageMetadata>, DispatchError> {
        self.engine
            .send_batch(self.queue(queue), messages, cancel)
            .await
    }

    /// Send a user registration as a structured message.
    ///
    /// # Errors
    /// Returns `DispatchError` if the registration was not written.
    pub async fn send_user_registration(
        &self,
        queue: &str,
        registration: &UserRegistration,
        cancel: &CancellationToken,
    ) -> Result<MessageMetadata, DispatchError> {
        let message = Message::structured(registration).map_err(|e| {
            self.engine
                .report_failure(DispatchError::Serialization(e.to_string()))
        })?;
        self.send_message(queue, message, cancel).await
    }

    /// Number of messages waiting in `queue`.
    ///
    /// # Errors
    /// Returns `DispatchError` if the store could not be read.
    pub async fn queue_size(
        &self,
        queue: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, DispatchError> {
        self.engine.queue_size(self.queue(queue), cancel).await
    }

    pub fn health(&self) -> HealthStatus {
        self.engine.health()
    }

    /// Stop accepting calls, drain in-flight ones and release the store.
    ///
    /// # Errors
    /// Returns the store's error if releasing its connection fails.
    pub async fn close(&self) -> Result<(), StoreError> {
        self.engine.close().await
    }

    fn queue<'a>(&'a self, queue: &'a str) -> &'a str {
        if queue.is_empty() {
            &self.config.default_queue
        } else {
            queue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::domain::envelope::MessageEnvelope;
    use crate::domain::health::ConnectionState;
    use crate::infrastructure::mocks::{FlakyStore, MockClock};
    use parking_lot::Mutex;
    use std::time::Instant;

    async fn sender_with(store: &Arc<FlakyStore>) -> Sender {
        Sender::builder(SenderConfig::default())
            .with_store(Arc::clone(store) as Arc<dyn ListStore>)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_build_pings_store() {
        let store = Arc::new(FlakyStore::new());
        let sender = sender_with(&store).await;

        let health = sender.health();
        assert_eq!(health.connection_state, ConnectionState::Connected);
        assert_eq!(health.circuit_breaker, "closed");
    }

    #[tokio::test]
    async fn test_build_fails_when_store_unreachable() {
        let store = Arc::new(FlakyStore::new());
        store.set_failing(true);

        let err = Sender::builder(SenderConfig::default())
            .with_store(Arc::clone(&store) as Arc<dyn ListStore>)
            .build()
            .await
            .unwrap_err();

        assert!(matches!(err, SenderError::Connection(StoreError::Connection(_))));
        assert_eq!(store.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_connecting() {
        let store = Arc::new(FlakyStore::new());

        let err = Sender::builder(SenderConfig::default().with_database(16))
            .with_store(Arc::clone(&store) as Arc<dyn ListStore>)
            .build()
            .await
            .unwrap_err();

        assert!(matches!(err, SenderError::Config(ConfigError::InvalidDatabase(16))));
        assert_eq!(store.close_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_queue_name_uses_default_queue() {
        let store = Arc::new(FlakyStore::new());
        let sender = sender_with(&store).await;
        let cancel = CancellationToken::new();

        let meta = sender.send_message("", "hello", &cancel).await.unwrap();

        assert_eq!(meta.queue, "user-registrations");
        assert_eq!(meta.ttl, Duration::from_secs(86_400));
        assert_eq!(store.inner().items("queue:user-registrations").len(), 1);
        assert_eq!(sender.queue_size("", &cancel).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_falls_back_to_configured_ttl() {
        let store = Arc::new(FlakyStore::new());
        let sender = sender_with(&store).await;
        let cancel = CancellationToken::new();

        let meta = sender
            .send_message_with_ttl("jobs", "x", Duration::ZERO, &cancel)
            .await
            .unwrap();
        assert_eq!(meta.ttl, Duration::from_secs(86_400));

        let meta = sender
            .send_message_with_ttl("jobs", "x", Duration::from_secs(90), &cancel)
            .await
            .unwrap();
        assert_eq!(meta.ttl, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_ttl_beyond_store_range_is_an_error() {
        let store = Arc::new(FlakyStore::new());
        let sender = sender_with(&store).await;
        let cancel = CancellationToken::new();

        let err = sender
            .send_message_with_ttl("jobs", "x", Duration::MAX, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::InvalidTtl(Duration::MAX)));
        assert_eq!(sender.queue_size("jobs", &cancel).await.unwrap(), 0);
        assert_eq!(sender.health().error_count, 1);
    }

    #[tokio::test]
    async fn test_user_registration_round_trips_through_codec() {
        let store = Arc::new(FlakyStore::new());
        let sender = sender_with(&store).await;
        let cancel = CancellationToken::new();
        let registration = UserRegistration::new("Ada", "ada@example.com", 42, "telegram");

        sender
            .send_user_registration("signups", &registration, &cancel)
            .await
            .unwrap();

        let raw = store.inner().pop_tail("queue:signups").unwrap();
        let envelope = MessageEnvelope::from_bytes(&raw).unwrap();
        let decoded: UserRegistration = sender.codec().decode(&envelope.payload).unwrap();
        assert_eq!(decoded, registration);
    }

    #[tokio::test]
    async fn test_queue_namer_and_handlers() {
        let store = Arc::new(FlakyStore::new());
        let written = Arc::new(Mutex::new(Vec::new()));
        let failed = Arc::new(Mutex::new(0u32));

        let sender = {
            let written = Arc::clone(&written);
            let failed = Arc::clone(&failed);
            Sender::builder(SenderConfig::default())
                .with_store(Arc::clone(&store) as Arc<dyn ListStore>)
                .with_queue_namer(|queue| format!("tenant:{queue}"))
                .on_success(move |meta| written.lock().push(meta.queue.clone()))
                .on_error(move |_| *failed.lock() += 1)
                .build()
                .await
                .unwrap()
        };
        let cancel = CancellationToken::new();

        sender
            .send_batch("jobs", &["a".into(), "b".into()], &cancel)
            .await
            .unwrap();
        let _ = sender.send_batch("jobs", &[], &cancel).await;

        assert_eq!(store.inner().items("tenant:jobs").len(), 2);
        assert_eq!(*written.lock(), vec!["jobs".to_string(), "jobs".to_string()]);
        assert_eq!(*failed.lock(), 1);
    }

    #[tokio::test]
    async fn test_state_change_handler_sees_breaker_trip() {
        let store = Arc::new(FlakyStore::new());
        let changes = Arc::new(Mutex::new(Vec::new()));
        let clock = Arc::new(MockClock::new(Instant::now()));

        let sender = {
            let changes = Arc::clone(&changes);
            Sender::builder(SenderConfig::default().with_breaker(CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            }))
            .with_store(Arc::clone(&store) as Arc<dyn ListStore>)
            .with_clock(clock)
            .on_state_change(move |change| changes.lock().push((change.from, change.to)))
            .build()
            .await
            .unwrap()
        };
        let cancel = CancellationToken::new();

        store.set_failing(true);
        for _ in 0..2 {
            let _ = sender.send_message("jobs", "x", &cancel).await;
        }

        assert_eq!(
            *changes.lock(),
            vec![(CircuitState::Closed, CircuitState::Open)]
        );
        assert_eq!(sender.health().circuit_breaker, "open");
    }

    #[tokio::test]
    async fn test_clones_share_one_engine() {
        let store = Arc::new(FlakyStore::new());
        let sender = sender_with(&store).await;
        let clone = sender.clone();
        let cancel = CancellationToken::new();

        clone.send_message("jobs", "x", &cancel).await.unwrap();
        sender.close().await.unwrap();

        assert_eq!(sender.health().messages_sent, 1);
        assert!(matches!(
            clone.send_message("jobs", "y", &cancel).await,
            Err(DispatchError::Closed)
        ));
    }
}
