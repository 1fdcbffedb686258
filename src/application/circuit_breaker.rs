//! Circuit breaker around transport calls.
//!
//! Keeps a failing store from being hammered. After too many consecutive
//! failures the circuit opens and calls are refused without reaching the
//! store. Once `timeout` has passed a limited number of trial calls are let
//! through; enough successes close the circuit again, any failure reopens it.
//!
//! Every transition starts a new generation and clears the counts. Outcomes
//! reported by calls that started in an earlier generation are dropped.

use crate::application::ports::Clock;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Timeout applied when the configured one is zero.
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, operating normally
    Closed,
    /// Circuit is open due to failures, refusing calls
    Open,
    /// Circuit is testing if the store has recovered
    HalfOpen,
}

impl CircuitState {
    /// Lowercase label used in logs and health reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Trial calls allowed while half-open, and successes needed to close.
    /// Zero is treated as one.
    pub max_requests: u32,
    /// Period after which closed-state counts are cleared. Zero never clears.
    pub interval: Duration,
    /// How long the circuit stays open. Zero is treated as 60 seconds.
    pub timeout: Duration,
    /// The circuit opens once consecutive failures exceed this number
    pub failure_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            interval: Duration::from_secs(120),
            timeout: DEFAULT_OPEN_TIMEOUT,
            failure_threshold: 3,
        }
    }
}

/// Request and outcome counts for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

/// A transition between two circuit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Observer invoked after every state transition.
pub type StateChangeHook = Arc<dyn Fn(StateChange) + Send + Sync>;

/// Outcome of a call refused or failed through the breaker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BreakerError<E> {
    /// The circuit is open
    #[error("circuit breaker is open")]
    Open,
    /// The circuit is half-open and its trial quota is in use
    #[error("too many requests while circuit breaker is half-open")]
    TooManyRequests,
    /// The operation ran and failed
    #[error(transparent)]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Check whether the breaker refused the call without running it.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, BreakerError::Operation(_))
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// Closed: next count reset, if any. Open: end of the open period.
    expiry: Option<Instant>,
}

/// Three-state circuit breaker shared by all calls of a sender.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    on_state_change: Option<StateChangeHook>,
    core: Mutex<BreakerCore>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("core", &*self.core.lock())
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a closed circuit breaker.
    ///
    /// # Arguments
    /// * `config` - Thresholds and timings
    /// * `clock` - Time source for the open period and count resets
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let config = CircuitBreakerConfig {
            max_requests: config.max_requests.max(1),
            timeout: if config.timeout.is_zero() {
                DEFAULT_OPEN_TIMEOUT
            } else {
                config.timeout
            },
            ..config
        };

        let now = clock.now();
        let expiry = Self::closed_expiry(&config, now);
        Self {
            config,
            clock,
            on_state_change: None,
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    /// Register an observer for state transitions.
    pub fn with_state_change_hook(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }

    /// Effective configuration after zero values were replaced.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current circuit state.
    ///
    /// Reading the state also applies any transition that is due, such as
    /// moving from open to half-open once the timeout has passed.
    pub fn state(&self) -> CircuitState {
        let mut changes = Vec::new();
        let state = {
            let mut core = self.core.lock();
            self.refresh(&mut core, self.clock.now(), &mut changes);
            core.state
        };
        self.notify(changes);
        state
    }

    /// Counts for the current generation.
    pub fn counts(&self) -> Counts {
        let mut changes = Vec::new();
        let counts = {
            let mut core = self.core.lock();
            self.refresh(&mut core, self.clock.now(), &mut changes);
            core.counts
        };
        self.notify(changes);
        counts
    }

    /// Run `op` through the breaker.
    ///
    /// # Errors
    /// * `BreakerError::Open` if the circuit is open
    /// * `BreakerError::TooManyRequests` if the half-open quota is in use
    /// * `BreakerError::Operation` with the error returned by `op`
    ///
    /// If the returned future is dropped before `op` completes, the call is
    /// recorded as a failure.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.before_call()?;
        let mut guard = CallGuard {
            breaker: self,
            generation,
            finished: false,
        };

        let result = op().await;
        guard.finished = true;
        self.after_call(generation, result.is_ok());

        result.map_err(BreakerError::Operation)
    }

    /// Force the circuit closed and clear its counts.
    pub fn reset(&self) {
        let mut changes = Vec::new();
        {
            let mut core = self.core.lock();
            self.transition(&mut core, CircuitState::Closed, self.clock.now(), &mut changes);
            core.counts = Counts::default();
        }
        self.notify(changes);
    }

    fn before_call<E>(&self) -> Result<u64, BreakerError<E>> {
        let mut changes = Vec::new();
        let result = {
            let mut core = self.core.lock();
            self.refresh(&mut core, self.clock.now(), &mut changes);

            match core.state {
                CircuitState::Open => Err(BreakerError::Open),
                CircuitState::HalfOpen if core.counts.requests >= self.config.max_requests => {
                    Err(BreakerError::TooManyRequests)
                }
                _ => {
                    core.counts.on_request();
                    Ok(core.generation)
                }
            }
        };
        self.notify(changes);
        result
    }

    fn after_call(&self, generation: u64, success: bool) {
        let mut changes = Vec::new();
        {
            let mut core = self.core.lock();
            let now = self.clock.now();
            self.refresh(&mut core, now, &mut changes);
            if core.generation == generation {
                self.record(&mut core, success, now, &mut changes);
            }
        }
        self.notify(changes);
    }

    fn record(
        &self,
        core: &mut BreakerCore,
        success: bool,
        now: Instant,
        changes: &mut Vec<StateChange>,
    ) {
        if success {
            core.counts.on_success();
            if core.state == CircuitState::HalfOpen
                && core.counts.consecutive_successes >= self.config.max_requests
            {
                self.transition(core, CircuitState::Closed, now, changes);
            }
            return;
        }

        core.counts.on_failure();
        let trip = match core.state {
            CircuitState::Closed => core.counts.consecutive_failures > self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if trip {
            self.transition(core, CircuitState::Open, now, changes);
        }
    }

    /// Apply time-driven transitions.
    fn refresh(&self, core: &mut BreakerCore, now: Instant, changes: &mut Vec<StateChange>) {
        match (core.state, core.expiry) {
            (CircuitState::Closed, Some(expiry)) if expiry <= now => {
                self.new_generation(core, now);
            }
            (CircuitState::Open, Some(expiry)) if expiry <= now => {
                self.transition(core, CircuitState::HalfOpen, now, changes);
            }
            _ => {}
        }
    }

    fn transition(
        &self,
        core: &mut BreakerCore,
        to: CircuitState,
        now: Instant,
        changes: &mut Vec<StateChange>,
    ) {
        if core.state == to {
            return;
        }
        let from = core.state;
        core.state = to;
        self.new_generation(core, now);
        changes.push(StateChange { from, to });
    }

    fn new_generation(&self, core: &mut BreakerCore, now: Instant) {
        core.generation = core.generation.wrapping_add(1);
        core.counts = Counts::default();
        core.expiry = match core.state {
            CircuitState::Closed => Self::closed_expiry(&self.config, now),
            CircuitState::Open => Some(now + self.config.timeout),
            CircuitState::HalfOpen => None,
        };
    }

    fn closed_expiry(config: &CircuitBreakerConfig, now: Instant) -> Option<Instant> {
        if config.interval.is_zero() {
            None
        } else {
            Some(now + config.interval)
        }
    }

    fn notify(&self, changes: Vec<StateChange>) {
        for change in changes {
            tracing::info!(
                from = change.from.as_str(),
                to = change.to.as_str(),
                "circuit breaker state change"
            );
            if let Some(hook) = &self.on_state_change {
                hook(change);
            }
        }
    }
}

/// Records a failure if the call is abandoned mid-flight.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    finished: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.after_call(self.generation, false);
        }
    }
}
