//! Circuit breaker implementation with lock-free atomics
//!
//! The breaker is the single shared mutable resource crossed by concurrent calls. All state lives
//! in atomics updated by compare-and-swap; clones share the same state.
//!
//! Transitions:
//! - **Closed → Open** once consecutive failures reach `failure_threshold`.
//! - **Open → HalfOpen** for the first caller arriving after the reset timeout elapsed.
//! - **HalfOpen → Closed** when a trial call succeeds.
//! - **HalfOpen → Open** when a trial call fails; the reset timeout is multiplied by
//!   `backoff_factor` (capped at `max_reset_timeout`).

use crate::clock::{Clock, MonotonicClock};
use crate::error::ExecutionRejected;
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Short-circuits calls until the reset timeout elapses.
    Open,
    /// Trial mode allowing a limited number of trial calls.
    HalfOpen,
}

impl CircuitState {
    fn to_u8(self) -> u8 {
        match self {
            CircuitState::Closed => STATE_CLOSED,
            CircuitState::Open => STATE_OPEN,
            CircuitState::HalfOpen => STATE_HALF_OPEN,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            STATE_CLOSED => Some(CircuitState::Closed),
            STATE_OPEN => Some(CircuitState::Open),
            STATE_HALF_OPEN => Some(CircuitState::HalfOpen),
            _ => None,
        }
    }
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CircuitBreakerError {
    #[error("failure_threshold must be > 0 (got {provided})")]
    InvalidFailureThreshold { provided: usize },
    #[error("reset_timeout must be > 0 unless breaker is disabled (got {0:?})")]
    InvalidResetTimeout(Duration),
    #[error("half_open_max_calls must be > 0 (got {provided})")]
    InvalidHalfOpenLimit { provided: usize },
    #[error("backoff_factor must be finite and >= 1.0 (got {0})")]
    InvalidBackoffFactor(f64),
    #[error("max_reset_timeout {max:?} must not be shorter than reset_timeout {reset:?}")]
    InvalidMaxResetTimeout { reset: Duration, max: Duration },
}

/// Validated configuration for the circuit breaker.
///
/// Deserializes from a flat settings record, applying the same validation:
///
/// ```
/// use whiskers::CircuitBreakerConfig;
/// use std::time::Duration;
///
/// let config: CircuitBreakerConfig = serde_json::from_str(
///     r#"{ "failure_threshold": 5, "reset_timeout_ms": 30000, "backoff_factor": 2.0 }"#,
/// ).unwrap();
/// assert_eq!(config.reset_timeout(), Duration::from_secs(30));
/// assert_eq!(config.half_open_max_calls(), 1);
///
/// let invalid = serde_json::from_str::<CircuitBreakerConfig>(
///     r#"{ "failure_threshold": 0, "reset_timeout_ms": 30000 }"#,
/// );
/// assert!(invalid.is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "CircuitBreakerSettings")]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    reset_timeout: Duration,
    half_open_max_calls: usize,
    backoff_factor: f64,
    max_reset_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CircuitBreakerSettings {
    failure_threshold: usize,
    reset_timeout_ms: u64,
    #[serde(default = "default_half_open_max_calls")]
    half_open_max_calls: usize,
    #[serde(default = "default_backoff_factor")]
    backoff_factor: f64,
    #[serde(default)]
    max_reset_timeout_ms: Option<u64>,
}

fn default_half_open_max_calls() -> usize {
    1
}

fn default_backoff_factor() -> f64 {
    1.0
}

impl TryFrom<CircuitBreakerSettings> for CircuitBreakerConfig {
    type Error = CircuitBreakerError;

    fn try_from(settings: CircuitBreakerSettings) -> Result<Self, Self::Error> {
        let reset_timeout = Duration::from_millis(settings.reset_timeout_ms);
        let max_reset_timeout =
            settings.max_reset_timeout_ms.map(Duration::from_millis).unwrap_or(reset_timeout);
        let config = Self {
            failure_threshold: settings.failure_threshold,
            reset_timeout,
            half_open_max_calls: settings.half_open_max_calls,
            backoff_factor: settings.backoff_factor,
            max_reset_timeout,
        };
        config.validate()?;
        Ok(config)
    }
}

impl CircuitBreakerConfig {
    /// Create a config with validation. No reset-timeout backoff.
    pub fn new(
        failure_threshold: usize,
        reset_timeout: Duration,
        half_open_max_calls: usize,
    ) -> Result<Self, CircuitBreakerError> {
        let cfg = Self {
            failure_threshold,
            reset_timeout,
            half_open_max_calls,
            backoff_factor: 1.0,
            max_reset_timeout: reset_timeout,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// A breaker that never opens.
    pub fn disabled() -> Self {
        Self {
            failure_threshold: usize::MAX,
            reset_timeout: Duration::MAX,
            half_open_max_calls: usize::MAX,
            backoff_factor: 1.0,
            max_reset_timeout: Duration::MAX,
        }
    }

    /// Grow the reset timeout by `factor` after every failed trial, up to `max_reset_timeout`.
    pub fn with_backoff(
        mut self,
        factor: f64,
        max_reset_timeout: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        self.backoff_factor = factor;
        self.max_reset_timeout = max_reset_timeout;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), CircuitBreakerError> {
        if self.failure_threshold == 0 {
            return Err(CircuitBreakerError::InvalidFailureThreshold { provided: 0 });
        }
        if self.half_open_max_calls == 0 {
            return Err(CircuitBreakerError::InvalidHalfOpenLimit { provided: 0 });
        }
        let disabled = self.failure_threshold == usize::MAX;
        if self.reset_timeout == Duration::ZERO && !disabled {
            return Err(CircuitBreakerError::InvalidResetTimeout(self.reset_timeout));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(CircuitBreakerError::InvalidBackoffFactor(self.backoff_factor));
        }
        if self.max_reset_timeout < self.reset_timeout {
            return Err(CircuitBreakerError::InvalidMaxResetTimeout {
                reset: self.reset_timeout,
                max: self.max_reset_timeout,
            });
        }
        Ok(())
    }

    /// Consecutive failures before opening from Closed.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Initial duration to stay Open before a trial call.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Maximum concurrent trial calls while Half-Open.
    pub fn half_open_max_calls(&self) -> usize {
        self.half_open_max_calls
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn max_reset_timeout(&self) -> Duration {
        self.max_reset_timeout
    }
}

/// State change or rejection observed by breaker listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitEvent {
    Opened { failure_count: usize, reset_timeout: Duration },
    HalfOpened,
    Closed,
    Rejected { state: CircuitState },
}

type Listener = Arc<dyn Fn(&CircuitEvent) + Send + Sync>;

#[derive(Debug)]
struct BreakerState {
    state: AtomicU8,
    failure_count: AtomicUsize,
    opened_at_millis: AtomicU64,
    half_open_calls: AtomicUsize,
    reset_timeout_millis: AtomicU64,
}

impl BreakerState {
    fn release_half_open_slot(&self) {
        let _ = self.half_open_calls.fetch_update(Ordering::AcqRel, Ordering::Acquire, |calls| {
            Some(calls.saturating_sub(1))
        });
    }
}

/// Permission to run one call through the breaker.
///
/// Holding a permit obtained in Half-Open occupies a trial slot; dropping it (including on panic)
/// frees the slot.
#[derive(Debug)]
#[must_use = "a permit must be held while the protected call runs"]
pub struct Permit<'a> {
    state: &'a BreakerState,
    trial: bool,
}

impl Permit<'_> {
    /// True when this call is a Half-Open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial {
            self.state.release_half_open_slot();
        }
    }
}

/// Circuit breaker shared by every request passing through one guard.
///
/// Clones share the same underlying state via `Arc`, so all handles observe and affect the same
/// circuit lifecycle.
#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<BreakerState>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    listeners: Arc<Vec<Listener>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker opening after `failure_threshold` consecutive failures and trying again
    /// after `reset_timeout`.
    ///
    /// # Examples
    /// ```
    /// use whiskers::CircuitBreaker;
    /// use std::time::Duration;
    /// let breaker = CircuitBreaker::new(5, Duration::from_secs(30)).unwrap();
    /// ```
    pub fn new(
        failure_threshold: usize,
        reset_timeout: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        CircuitBreakerConfig::new(failure_threshold, reset_timeout, 1).map(Self::from_config)
    }

    /// Create a breaker from an explicit config, validating the values.
    pub fn with_config(config: CircuitBreakerConfig) -> Result<Self, CircuitBreakerError> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Override the maximum number of half-open trial calls; must be > 0.
    pub fn with_half_open_limit(mut self, limit: usize) -> Result<Self, CircuitBreakerError> {
        if limit == 0 {
            return Err(CircuitBreakerError::InvalidHalfOpenLimit { provided: limit });
        }
        self.config.half_open_max_calls = limit;
        Ok(self)
    }

    /// Register a callback invoked on every transition and rejection.
    pub fn with_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&CircuitEvent) + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.listeners).push(Arc::new(listener));
        self
    }

    fn from_config(config: CircuitBreakerConfig) -> Self {
        let state = Arc::new(BreakerState {
            state: AtomicU8::new(CircuitState::Closed.to_u8()),
            failure_count: AtomicUsize::new(0),
            opened_at_millis: AtomicU64::new(0),
            half_open_calls: AtomicUsize::new(0),
            reset_timeout_millis: AtomicU64::new(millis(config.reset_timeout)),
        });
        Self {
            state,
            config,
            clock: Arc::new(MonotonicClock::default()),
            listeners: Arc::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An Open breaker whose reset timeout elapsed still reports Open until the
    /// next call attempts the trial.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.state.load(Ordering::Acquire))
            .unwrap_or(CircuitState::Closed)
    }

    /// Consecutive failures recorded since the last success or reset.
    pub fn failure_count(&self) -> usize {
        self.state.failure_count.load(Ordering::Acquire)
    }

    /// Reset timeout currently in force, including backoff growth.
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.state.reset_timeout_millis.load(Ordering::Acquire))
    }

    /// Force the breaker back to Closed and clear its counters.
    pub fn reset(&self) {
        self.state.state.store(CircuitState::Closed.to_u8(), Ordering::Release);
        self.state.failure_count.store(0, Ordering::Release);
        self.state.opened_at_millis.store(0, Ordering::Release);
        self.state.half_open_calls.store(0, Ordering::Release);
        self.state.reset_timeout_millis.store(millis(self.config.reset_timeout), Ordering::Release);
        tracing::info!("Circuit breaker reset → closed");
        self.emit(CircuitEvent::Closed);
    }

    /// Ask whether a call may proceed.
    ///
    /// # Behavior
    /// - **Closed**: always allowed.
    /// - **Open**: rejected until the reset timeout elapses; the first caller afterwards moves
    ///   the breaker to Half-Open and runs the trial.
    /// - **HalfOpen**: allowed while fewer than `half_open_max_calls` trials are in flight.
    pub fn try_acquire(&self) -> Result<Permit<'_>, ExecutionRejected> {
        loop {
            let raw = self.state.state.load(Ordering::Acquire);
            let Some(current) = CircuitState::from_u8(raw) else {
                return Err(self.reject(CircuitState::Open, "breaker state is invalid"));
            };

            match current {
                CircuitState::Closed => {
                    return Ok(Permit { state: &self.state, trial: false });
                }
                CircuitState::Open => {
                    if self.open_elapsed_millis()
                        < self.state.reset_timeout_millis.load(Ordering::Acquire)
                    {
                        return Err(self.reject(CircuitState::Open, "circuit breaker is open"));
                    }
                    match self.state.state.compare_exchange(
                        STATE_OPEN,
                        STATE_HALF_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            // We won the race - we're the first half-open caller
                            self.state.half_open_calls.store(1, Ordering::Release);
                            tracing::info!("Circuit breaker → half-open");
                            self.emit(CircuitEvent::HalfOpened);
                            return Ok(Permit { state: &self.state, trial: true });
                        }
                        Err(STATE_HALF_OPEN) | Err(STATE_CLOSED) => continue,
                        Err(_) => {
                            return Err(self.reject(CircuitState::Open, "breaker state is invalid"))
                        }
                    }
                }
                CircuitState::HalfOpen => {
                    let in_flight = self.state.half_open_calls.fetch_add(1, Ordering::AcqRel);
                    if in_flight >= self.config.half_open_max_calls {
                        self.state.release_half_open_slot();
                        return Err(self.reject(
                            CircuitState::HalfOpen,
                            "half-open trial capacity exhausted",
                        ));
                    }
                    tracing::debug!(
                        in_flight = in_flight + 1,
                        max = self.config.half_open_max_calls,
                        "Circuit breaker: half-open trial request"
                    );
                    return Ok(Permit { state: &self.state, trial: true });
                }
            }
        }
    }

    /// Run `operation` under breaker protection.
    ///
    /// Rejections are converted into the caller's error type and `operation` is never invoked.
    /// Otherwise the outcome is recorded (`Ok` as success, `Err` as failure) and returned
    /// unchanged. The permit is held until the outcome is recorded.
    pub async fn protect<T, E, Fut, Op>(&self, operation: Op) -> Result<T, E>
    where
        E: From<ExecutionRejected>,
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        let permit = self.try_acquire()?;
        let result = operation().await;

        match &result {
            Ok(_) => self.record_success(&permit),
            Err(_) => self.record_failure(&permit),
        }
        drop(permit);
        result
    }

    /// Any success in Closed resets the counter to 0, so only consecutive failures trip the
    /// breaker. In Half-Open only a trial permit closes it; calls admitted before the breaker
    /// opened are ignored.
    pub fn record_success(&self, permit: &Permit<'_>) {
        match CircuitState::from_u8(self.state.state.load(Ordering::Acquire)) {
            Some(CircuitState::HalfOpen) if !permit.is_trial() => {
                tracing::debug!("Circuit breaker: stale success ignored while half-open");
            }
            Some(CircuitState::HalfOpen) => {
                if self
                    .state
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_CLOSED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.state.half_open_calls.store(0, Ordering::Release);
                    self.state.failure_count.store(0, Ordering::Release);
                    self.state.opened_at_millis.store(0, Ordering::Release);
                    self.state
                        .reset_timeout_millis
                        .store(millis(self.config.reset_timeout), Ordering::Release);
                    tracing::info!("Circuit breaker → closed");
                    self.emit(CircuitEvent::Closed);
                }
            }
            Some(CircuitState::Closed) => {
                self.state.failure_count.store(0, Ordering::Release);
            }
            _ => {}
        }
    }

    /// Count a failure. In Half-Open only a trial permit reopens the breaker.
    pub fn record_failure(&self, permit: &Permit<'_>) {
        let current = CircuitState::from_u8(self.state.state.load(Ordering::Acquire));
        if current == Some(CircuitState::HalfOpen) && !permit.is_trial() {
            tracing::debug!("Circuit breaker: stale failure ignored while half-open");
            return;
        }
        let failures = self.state.failure_count.fetch_add(1, Ordering::AcqRel).saturating_add(1);

        match current {
            Some(CircuitState::HalfOpen) => {
                if self
                    .state
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    let reset_timeout = self.grow_reset_timeout();
                    self.state.half_open_calls.store(0, Ordering::Release);
                    self.state.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                    tracing::warn!(
                        failures,
                        ?reset_timeout,
                        "Circuit breaker: trial failed → open"
                    );
                    self.emit(CircuitEvent::Opened { failure_count: failures, reset_timeout });
                }
            }
            Some(CircuitState::Closed) => {
                if failures >= self.config.failure_threshold
                    && self
                        .state
                        .state
                        .compare_exchange(
                            STATE_CLOSED,
                            STATE_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.state.half_open_calls.store(0, Ordering::Release);
                    self.state.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                    let reset_timeout = self.reset_timeout();
                    tracing::error!(
                        failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker → open"
                    );
                    self.emit(CircuitEvent::Opened { failure_count: failures, reset_timeout });
                }
            }
            _ => {}
        }
    }

    fn grow_reset_timeout(&self) -> Duration {
        let current = self.state.reset_timeout_millis.load(Ordering::Acquire);
        let cap = millis(self.config.max_reset_timeout);
        let grown = ((current as f64) * self.config.backoff_factor).min(cap as f64) as u64;
        let next = grown.max(current.min(cap));
        self.state.reset_timeout_millis.store(next, Ordering::Release);
        Duration::from_millis(next)
    }

    fn open_elapsed_millis(&self) -> u64 {
        let opened_at = self.state.opened_at_millis.load(Ordering::Acquire);
        self.clock.now_millis().saturating_sub(opened_at)
    }

    fn reject(&self, state: CircuitState, reason: &str) -> ExecutionRejected {
        let open_for = Duration::from_millis(self.open_elapsed_millis());
        tracing::debug!(?state, reason, "Circuit breaker rejected call");
        self.emit(CircuitEvent::Rejected { state });
        ExecutionRejected::new(reason, state, self.failure_count(), open_for)
    }

    fn emit(&self, event: CircuitEvent) {
        for listener in self.listeners.iter() {
            listener(&event);
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
