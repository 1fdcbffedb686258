//! Manually driven clock.

use crate::application::ports::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock whose time only moves when a test says so.
///
/// Drives the circuit breaker's open period and the in-memory store's
/// expiry deterministically. Clones share one time source.
///
/// ```ignore
/// use valkey_dispatch::infrastructure::mocks::MockClock;
/// use valkey_dispatch::Clock;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
/// clock.advance(Duration::from_secs(60));
/// assert_eq!(clock.elapsed(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    now: Arc<Mutex<Instant>>,
}

impl MockClock {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Jump to `instant`, which may lie before the current time.
    pub fn set(&self, instant: Instant) {
        *self.now.lock() = instant;
    }

    /// Time advanced since construction.
    pub fn elapsed(&self) -> Duration {
        self.now.lock().saturating_duration_since(self.start)
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_time() {
        let start = Instant::now();
        let clock = MockClock::new(start);
        let other = clock.clone();

        other.advance(Duration::from_secs(10));
        assert_eq!(clock.now(), start + Duration::from_secs(10));
        assert_eq!(clock.elapsed(), Duration::from_secs(10));

        clock.set(start);
        assert_eq!(other.elapsed(), Duration::ZERO);
    }
}
