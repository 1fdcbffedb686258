//! Dispatch engine.
//!
//! Every call follows the same path: admission, payload encoding, envelope
//! construction, then one atomic store operation run through the circuit
//! breaker. Outcomes update the health counters and fire the observers.
//!
//! Failed send calls are counted exactly once, whichever stage failed.
//! Queue-size reads only update the connection flag.

use crate::application::admission::AdmissionController;
use crate::application::circuit_breaker::{BreakerError, CircuitBreaker};
use crate::application::error::DispatchError;
use crate::application::health::HealthAggregator;
use crate::application::ports::{ListStore, StoreError, TtlMode, MAX_TTL, MIN_TTL};
use crate::domain::codec::{JsonCodec, MessageCodec};
use crate::domain::envelope::{MessageEnvelope, MessageMetadata};
use crate::domain::health::HealthStatus;
use crate::domain::message::Message;
use crate::domain::queue_key::{PrefixResolver, QueueKeyResolver};
use chrono::Utc;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;

/// Observer called once per message written.
pub type SuccessHandler = Arc<dyn Fn(&MessageMetadata) + Send + Sync>;

/// Observer called once per failed send call.
pub type ErrorHandler = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// Per-engine write settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// TTL applied by batch sends and plain single sends
    pub default_ttl: Duration,
    /// How pushes refresh the queue expiry
    pub ttl_mode: TtlMode,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(24 * 60 * 60),
            ttl_mode: TtlMode::Sliding,
        }
    }
}

/// Core send path shared by all callers of a sender.
pub struct DispatchEngine {
    store: Arc<dyn ListStore>,
    admission: AdmissionController,
    breaker: CircuitBreaker,
    health: HealthAggregator,
    resolver: Arc<dyn QueueKeyResolver>,
    codec: Arc<dyn MessageCodec>,
    settings: DispatchSettings,
    on_success: Option<SuccessHandler>,
    on_error: Option<ErrorHandler>,
    closed: AtomicBool,
    /// Operations hold a read guard; close takes the write side to drain them
    in_flight: RwLock<()>,
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("store", &self.store)
            .field("admission", &self.admission)
            .field("breaker", &self.breaker)
            .field("resolver", &self.resolver)
            .field("codec", &self.codec)
            .field("settings", &self.settings)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    /// Create an engine with the default resolver, codec and settings.
    pub fn new(
        store: Arc<dyn ListStore>,
        admission: AdmissionController,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            store,
            admission,
            breaker,
            health: HealthAggregator::new(),
            resolver: Arc::new(PrefixResolver::default()),
            codec: Arc::new(JsonCodec::new()),
            settings: DispatchSettings::default(),
            on_success: None,
            on_error: None,
            closed: AtomicBool::new(false),
            in_flight: RwLock::new(()),
        }
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn QueueKeyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_success_handler(mut self, handler: SuccessHandler) -> Self {
        self.on_success = Some(handler);
        self
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Write settings in effect.
    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    /// Codec used to encode payloads.
    pub fn codec(&self) -> &dyn MessageCodec {
        self.codec.as_ref()
    }

    /// Store key a queue name resolves to.
    pub fn queue_key(&self, queue: &str) -> String {
        self.resolver.resolve(queue)
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Write one message to `queue`, setting the queue expiry to `ttl`.
    ///
    /// # Returns
    /// Metadata of the envelope written, with position 0.
    ///
    /// # Errors
    /// * `DispatchError::InvalidTtl` if `ttl` is below 1ms or above [`MAX_TTL`]
    /// * `DispatchError::RateLimited` if `cancel` fires during admission
    /// * `DispatchError::Serialization` if the codec rejects the payload
    /// * `DispatchError::CircuitOpen` if the breaker refuses the call
    /// * `DispatchError::Transport` if the store call fails
    /// * `DispatchError::Closed` after [`close`](Self::close)
    pub async fn send_one(
        &self,
        queue: &str,
        message: &Message,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<MessageMetadata, DispatchError> {
        let written = self.observe(
            self.write(queue, std::slice::from_ref(message), ttl, cancel)
                .await,
        )?;
        written.into_iter().next().ok_or(DispatchError::EmptyBatch)
    }

    /// Write all `messages` to `queue` in one atomic store operation.
    ///
    /// One admission token covers the whole batch. Messages share a
    /// submission timestamp and the default TTL; either all of them are
    /// written or none is.
    ///
    /// # Errors
    /// As [`send_one`](Self::send_one), plus `DispatchError::EmptyBatch`
    /// when `messages` is empty.
    pub async fn send_batch(
        &self,
        queue: &str,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageMetadata>, DispatchError> {
        self.observe(
            self.write(queue, messages, self.settings.default_ttl, cancel)
                .await,
        )
    }

    /// Number of messages waiting in `queue`; a missing queue holds 0.
    pub async fn queue_size(
        &self,
        queue: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, DispatchError> {
        let _in_flight = self.enter().await?;
        self.admission.acquire(cancel).await?;

        let key = self.resolver.resolve(queue);
        let result = self
            .breaker
            .execute(|| with_cancel(cancel, self.store.len(&key)))
            .await;
        self.track_connection(queue, result)
    }

    /// Check the store and update the connection flag.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let result = self.store.ping().await;
        self.health.set_connected(result.is_ok());
        result
    }

    /// Current health report.
    pub fn health(&self) -> HealthStatus {
        self.health.snapshot(self.breaker.state())
    }

    /// Check whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting calls, wait for in-flight ones, then close the store.
    ///
    /// Calling this more than once is a no-op.
    ///
    /// # Errors
    /// Returns the store's error if releasing its connections fails.
    pub async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.admission.close();
        let _drained = self.in_flight.write().await;
        self.health.set_connected(false);

        match self.store.close().await {
            Ok(()) => {
                tracing::info!("dispatch engine closed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to close store");
                Err(err)
            }
        }
    }

    async fn enter(&self) -> Result<RwLockReadGuard<'_, ()>, DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        let guard = self.in_flight.read().await;
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        Ok(guard)
    }

    async fn write(
        &self,
        queue: &str,
        messages: &[Message],
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageMetadata>, DispatchError> {
        let _in_flight = self.enter().await?;
        if messages.is_empty() {
            return Err(DispatchError::EmptyBatch);
        }
        if !(MIN_TTL..=MAX_TTL).contains(&ttl) {
            return Err(DispatchError::InvalidTtl(ttl));
        }
        self.admission.acquire(cancel).await?;

        let envelopes = self.wrap(queue, messages, ttl)?;
        let values = envelopes
            .iter()
            .map(|envelope| {
                envelope
                    .to_bytes()
                    .map_err(|e| DispatchError::Serialization(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let key = self.resolver.resolve(queue);
        let mode = self.settings.ttl_mode;
        let result = self
            .breaker
            .execute(|| with_cancel(cancel, self.store.push_with_expiry(&key, values, ttl, mode)))
            .await;
        let length = self.track_connection(queue, result)?;

        match envelopes.as_slice() {
            [envelope] => tracing::debug!(
                queue,
                message_id = %envelope.id,
                size = envelope.payload.len(),
                ttl_secs = ttl.as_secs(),
                "message sent"
            ),
            _ => tracing::debug!(
                queue,
                count = envelopes.len(),
                queue_length = length,
                ttl_secs = ttl.as_secs(),
                "batch sent"
            ),
        }

        Ok(envelopes
            .iter()
            .enumerate()
            .map(|(position, envelope)| envelope.metadata_at(position))
            .collect())
    }

    fn wrap(
        &self,
        queue: &str,
        messages: &[Message],
        ttl: Duration,
    ) -> Result<Vec<MessageEnvelope>, DispatchError> {
        let created_at = Utc::now();
        let content_type = self.codec.content_type();

        messages
            .iter()
            .map(|message| -> Result<MessageEnvelope, DispatchError> {
                let payload = self.codec.serialize(message)?;
                Ok(MessageEnvelope::new(
                    queue,
                    payload,
                    content_type,
                    created_at,
                    ttl,
                ))
            })
            .collect()
    }

    fn track_connection<T>(
        &self,
        queue: &str,
        result: Result<T, BreakerError<StoreError>>,
    ) -> Result<T, DispatchError> {
        match result {
            Ok(value) => {
                self.health.set_connected(true);
                Ok(value)
            }
            Err(err) => {
                if matches!(&err, BreakerError::Operation(e) if !matches!(e, StoreError::Cancelled))
                {
                    self.health.set_connected(false);
                }
                Err(DispatchError::from_breaker(queue, err))
            }
        }
    }

    fn observe(
        &self,
        result: Result<Vec<MessageMetadata>, DispatchError>,
    ) -> Result<Vec<MessageMetadata>, DispatchError> {
        match result {
            Ok(written) => {
                self.health.record_success(written.len() as u64);
                if let Some(handler) = &self.on_success {
                    written.iter().for_each(|metadata| handler(metadata));
                }
                Ok(written)
            }
            Err(err) => Err(self.report_failure(err)),
        }
    }

    /// Count a send failure raised before the engine was reached and pass it
    /// to the error handler.
    pub fn report_failure(&self, err: DispatchError) -> DispatchError {
        self.health.record_failure(err.to_string());
        if let Some(handler) = &self.on_error {
            handler(&err);
        }
        err
    }
}

/// Race a store call against the caller's cancellation.
async fn with_cancel<T, F>(cancel: &CancellationToken, op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        result = op => result,
    }
}
