//! Admission control for outbound calls.
//!
//! A token bucket gates every dispatch. The bucket holds up to `burst`
//! tokens and refills continuously at `rate` tokens per second; each call
//! takes one token, waiting for the next one if the bucket is empty.
//!
//! Waiters queue on a fair async mutex, so tokens are handed out in arrival
//! order. A waiter that is cancelled leaves the queue without consuming
//! anything, and the next waiter sees the bucket exactly as it would have.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Longest single sleep while waiting for a token.
const MAX_WAIT: Duration = Duration::from_secs(60 * 60);

/// Error returned when admission is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The caller cancelled before a token became available
    #[error("rate limited: cancelled while waiting for a token")]
    RateLimited,
    /// The controller has been closed
    #[error("admission controller is closed")]
    Closed,
}

/// Error returned when the bucket parameters are invalid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdmissionConfigError {
    /// Refill rate must be a positive, finite number
    #[error("rate must be greater than 0, got {0}")]
    InvalidRate(f64),
    /// Burst must allow at least one call
    #[error("burst must be at least 1")]
    ZeroBurst,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by all callers of a sender.
#[derive(Debug)]
pub struct AdmissionController {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
    shutdown: CancellationToken,
}

impl AdmissionController {
    /// Create a controller that starts with a full bucket.
    ///
    /// # Arguments
    /// * `rate` - Tokens added per second
    /// * `burst` - Bucket capacity
    ///
    /// # Errors
    /// Returns `AdmissionConfigError` if `rate` is not positive or `burst` is zero.
    pub fn new(rate: f64, burst: u32) -> Result<Self, AdmissionConfigError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(AdmissionConfigError::InvalidRate(rate));
        }
        if burst == 0 {
            return Err(AdmissionConfigError::ZeroBurst);
        }

        let capacity = f64::from(burst);
        Ok(Self {
            rate,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            shutdown: CancellationToken::new(),
        })
    }

    /// Take one token, waiting until one is available.
    ///
    /// # Errors
    /// * `AdmissionError::RateLimited` if `cancel` fires first
    /// * `AdmissionError::Closed` if the controller is closed
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), AdmissionError> {
        let mut bucket = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(AdmissionError::Closed),
            _ = cancel.cancelled() => return Err(AdmissionError::RateLimited),
            guard = self.bucket.lock() => guard,
        };

        loop {
            self.refill(&mut bucket, Instant::now());
            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return Ok(());
            }

            let wait = self.time_until_token(&bucket);
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(AdmissionError::Closed),
                _ = cancel.cancelled() => return Err(AdmissionError::RateLimited),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Take a token only if one is available right now and nobody is queued.
    pub fn try_acquire(&self) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let Ok(mut bucket) = self.bucket.try_lock() else {
            return false;
        };

        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently in the bucket, waiting for queued callers first.
    pub async fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    /// Refuse current and future waits.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Check whether the controller has been closed.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
        bucket.last_refill = now;
    }

    /// Capped so very slow rates still wake up and recheck the bucket.
    fn time_until_token(&self, bucket: &Bucket) -> Duration {
        let missing = (1.0 - bucket.tokens).max(0.0);
        Duration::try_from_secs_f64(missing / self.rate)
            .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT))
    }
}
