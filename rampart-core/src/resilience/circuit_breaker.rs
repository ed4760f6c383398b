//! Circuit Breaker pattern implementation.
//!
//! The circuit breaker prevents cascade failures by counting consecutive
//! failures of one dependency and "opening" the circuit once a threshold is
//! reached. While open, calls fail fast with [`CircuitOpenError`] and the
//! operation is never invoked.
//!
//! ## States
//!
//! - **Closed**: Normal operation, calls pass through
//! - **Open**: Circuit is tripped, calls are rejected immediately
//! - **Half-Open**: Probing whether the dependency has recovered
//!
//! ```text
//! Closed   → Open:     consecutive failures reach failure_threshold
//! Open     → HalfOpen: reset_timeout elapsed (checked lazily on the next call)
//! HalfOpen → Closed:   success_threshold successes
//! HalfOpen → Open:     any failure
//! ```
//!
//! Every error returned by the operation counts as a failure. Callers that
//! want selective counting must filter before calling.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rampart_core::{BreakerError, CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::new(
//!     CircuitBreakerConfig::new("llm-provider")
//!         .failure_threshold(5)
//!         .success_threshold(2)
//!         .reset_timeout(Duration::from_secs(60)),
//! );
//!
//! match circuit.call(|| provider.complete(prompt)).await {
//!     Ok(text) => respond(text),
//!     Err(BreakerError::Open(e)) => service_unavailable(e.retry_after),
//!     Err(BreakerError::Operation(e)) => bad_gateway(e),
//! }
//! ```

use crate::error::{BreakerError, CircuitOpenError, ConfigError, OpenReason};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, testing recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Name of the protected dependency (for logging and errors).
    pub name: String,
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Number of half-open successes needed to close the circuit.
    pub success_threshold: u32,
    /// Time to wait before transitioning from open to half-open.
    pub reset_timeout: Duration,
    /// Maximum concurrent probes admitted while half-open (`None` = unlimited).
    pub half_open_max_calls: Option<u32>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration with a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the success threshold for recovery.
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the reset timeout.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Cap the number of concurrent half-open probes.
    pub fn half_open_max_calls(mut self, count: u32) -> Self {
        self.half_open_max_calls = Some(count);
        self
    }

    /// Check the configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::new("circuit breaker", "failure_threshold must be at least 1"));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::new("circuit breaker", "success_threshold must be at least 1"));
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::new("circuit breaker", "reset_timeout must be non-zero"));
        }
        if self.half_open_max_calls == Some(0) {
            return Err(ConfigError::new(
                "circuit breaker",
                "half_open_max_calls must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

/// Receives breaker state changes.
///
/// Listeners are called after the change is committed and outside the
/// breaker's lock; they cannot influence the transition.
pub trait TransitionListener: Send + Sync {
    /// Called once per state change.
    fn on_transition(&self, name: &str, from: CircuitState, to: CircuitState);
}

impl<F> TransitionListener for F
where
    F: Fn(&str, CircuitState, CircuitState) + Send + Sync,
{
    fn on_transition(&self, name: &str, from: CircuitState, to: CircuitState) {
        self(name, from, to)
    }
}

/// Mutable breaker state. Only touched while holding `CircuitBreaker::inner`.
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<Instant>,
    last_success_at: Option<Instant>,
    /// Bumped on every transition so late results can tell which episode admitted them.
    epoch: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            opened_at: None,
            last_failure_at: None,
            last_success_at: None,
            epoch: 0,
        }
    }

    /// Move to `to`, applying the entry rules of the target state.
    fn transition(&mut self, to: CircuitState, now: Instant) -> Option<(CircuitState, CircuitState)> {
        let from = self.state;
        if from == to {
            return None;
        }

        self.state = to;
        self.epoch = self.epoch.wrapping_add(1);
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;

        match to {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.opened_at = None;
            }
            CircuitState::Open => {
                self.opened_at = Some(now);
            }
            CircuitState::HalfOpen => {
                self.opened_at = None;
            }
        }

        Some((from, to))
    }
}

/// Ticket handed out when a call is admitted.
#[derive(Debug, Clone, Copy)]
struct Admission {
    epoch: u64,
    probe: bool,
}

/// Circuit breaker for protecting one dependency against cascade failures.
///
/// All counter updates and transitions for a breaker happen under a single
/// short-lived lock, so concurrent callers observe one linear sequence of
/// transitions. The lock is never held while the operation runs.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    listeners: RwLock<Vec<Arc<dyn TransitionListener>>>,
    total_calls: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    ///
    /// Zero thresholds are raised to 1; use [`try_new`](Self::try_new) to
    /// reject invalid configuration instead.
    pub fn new(mut config: CircuitBreakerConfig) -> Arc<Self> {
        config.failure_threshold = config.failure_threshold.max(1);
        config.success_threshold = config.success_threshold.max(1);
        config.half_open_max_calls = config.half_open_max_calls.map(|n| n.max(1));
        Self::build(config)
    }

    /// Create a new circuit breaker, validating the configuration.
    pub fn try_new(config: CircuitBreakerConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create with default configuration.
    pub fn default_circuit() -> Arc<Self> {
        Self::new(CircuitBreakerConfig::default())
    }

    fn build(config: CircuitBreakerConfig) -> Arc<Self> {
        info!(
            name = %config.name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            reset_timeout = ?config.reset_timeout,
            "Circuit breaker initialized"
        );

        Arc::new(Self {
            config,
            inner: Mutex::new(BreakerState::new()),
            listeners: RwLock::new(Vec::new()),
            total_calls: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        })
    }

    /// Get the circuit breaker name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Register a listener for state changes.
    pub fn add_listener(&self, listener: Arc<dyn TransitionListener>) {
        self.listeners.write().push(listener);
    }

    /// Get the current circuit state.
    ///
    /// An open circuit whose cooldown has elapsed is moved to half-open here,
    /// the same way an incoming call would.
    pub fn state(&self) -> CircuitState {
        let now = Instant::now();
        let (state, transition) = {
            let mut inner = self.inner.lock();
            let transition = self.maybe_half_open(&mut inner, now);
            (inner.state, transition)
        };
        self.notify(transition);
        state
    }

    /// Whether a call made now would be admitted. Does not reserve a probe slot.
    pub fn is_call_permitted(&self) -> bool {
        let now = Instant::now();
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => inner
                .opened_at
                .is_none_or(|at| now.saturating_duration_since(at) >= self.config.reset_timeout),
            CircuitState::HalfOpen => self
                .config
                .half_open_max_calls
                .is_none_or(|max| inner.half_open_in_flight < max),
        }
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// Fails with [`BreakerError::Open`] without invoking `f` while the
    /// circuit is open. Otherwise runs `f` and returns its error untouched
    /// inside [`BreakerError::Operation`].
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(rejection) => {
                self.total_rejections.fetch_add(1, Ordering::Relaxed);
                debug!(
                    name = %self.config.name,
                    reason = %rejection.reason,
                    retry_after = ?rejection.retry_after,
                    "Circuit breaker rejected request"
                );
                return Err(BreakerError::Open(rejection));
            }
        };

        match f().await {
            Ok(result) => {
                self.on_success(admission);
                Ok(result)
            }
            Err(e) => {
                self.on_failure(admission);
                Err(BreakerError::Operation(e))
            }
        }
    }

    /// Execute an operation whose error type can absorb a rejection.
    ///
    /// Same as [`call`](Self::call) but returns the operation's error as is,
    /// converting a rejection through `From<CircuitOpenError>`.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        match self.call(f).await {
            Ok(result) => Ok(result),
            Err(BreakerError::Open(e)) => Err(E::from(e)),
            Err(BreakerError::Operation(e)) => Err(e),
        }
    }

    /// Execute with a fallback used only when the circuit rejects the call.
    ///
    /// Errors from `f` itself still propagate unmodified.
    pub async fn call_with_fallback<F, Fut, FB, FbFut, T, E>(&self, f: F, fallback: FB) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
    {
        match self.call(f).await {
            Ok(result) => Ok(result),
            Err(BreakerError::Open(_)) => {
                debug!(name = %self.config.name, "Circuit open, using fallback");
                fallback().await
            }
            Err(BreakerError::Operation(e)) => Err(e),
        }
    }

    /// Decide whether a call may proceed, performing the lazy Open → HalfOpen check.
    fn admit(&self) -> Result<Admission, CircuitOpenError> {
        let now = Instant::now();
        let (result, transition) = {
            let mut inner = self.inner.lock();
            let transition = self.maybe_half_open(&mut inner, now);

            let result = match inner.state {
                CircuitState::Closed => Ok(Admission {
                    epoch: inner.epoch,
                    probe: false,
                }),
                CircuitState::Open => {
                    let elapsed = inner
                        .opened_at
                        .map(|at| now.saturating_duration_since(at))
                        .unwrap_or_default();
                    Err(CircuitOpenError::new(
                        self.config.name.clone(),
                        OpenReason::Open,
                        self.config.reset_timeout.saturating_sub(elapsed),
                    ))
                }
                CircuitState::HalfOpen => match self.config.half_open_max_calls {
                    Some(max) if inner.half_open_in_flight >= max => Err(CircuitOpenError::new(
                        self.config.name.clone(),
                        OpenReason::HalfOpenLimit,
                        Duration::ZERO,
                    )),
                    _ => {
                        inner.half_open_in_flight += 1;
                        Ok(Admission {
                            epoch: inner.epoch,
                            probe: true,
                        })
                    }
                },
            };
            (result, transition)
        };

        self.notify(transition);
        result
    }

    fn maybe_half_open(&self, inner: &mut BreakerState, now: Instant) -> Option<(CircuitState, CircuitState)> {
        if inner.state != CircuitState::Open {
            return None;
        }
        let due = inner
            .opened_at
            .is_none_or(|at| now.saturating_duration_since(at) >= self.config.reset_timeout);
        if !due {
            return None;
        }
        debug!(name = %self.config.name, "Circuit breaker transitioning to HALF-OPEN");
        inner.transition(CircuitState::HalfOpen, now)
    }

    fn release_probe(inner: &mut BreakerState, admission: Admission) {
        if admission.probe && admission.epoch == inner.epoch {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    fn on_success(&self, admission: Admission) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        let transition = {
            let mut inner = self.inner.lock();
            inner.last_success_at = Some(now);
            Self::release_probe(&mut inner, admission);

            match inner.state {
                CircuitState::Closed => {
                    inner.consecutive_failures = 0;
                    None
                }
                CircuitState::HalfOpen if admission.epoch != inner.epoch => {
                    debug!(name = %self.config.name, "Ignoring success admitted before this half-open episode");
                    None
                }
                CircuitState::HalfOpen => {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.success_threshold {
                        info!(name = %self.config.name, "Circuit breaker CLOSED");
                        inner.transition(CircuitState::Closed, now)
                    } else {
                        None
                    }
                }
                CircuitState::Open => {
                    // Late result from a call admitted before the circuit opened.
                    debug!(name = %self.config.name, "Success recorded while circuit open");
                    None
                }
            }
        };

        self.notify(transition);
    }

    fn on_failure(&self, admission: Admission) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        let transition = {
            let mut inner = self.inner.lock();
            inner.last_failure_at = Some(now);
            Self::release_probe(&mut inner, admission);

            match inner.state {
                CircuitState::Closed => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        warn!(
                            name = %self.config.name,
                            failures = inner.consecutive_failures,
                            reset_timeout = ?self.config.reset_timeout,
                            "Circuit breaker OPENED"
                        );
                        inner.transition(CircuitState::Open, now)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen if admission.epoch != inner.epoch => {
                    debug!(name = %self.config.name, "Ignoring failure admitted before this half-open episode");
                    None
                }
                CircuitState::HalfOpen => {
                    warn!(name = %self.config.name, "Half-open probe failed, circuit breaker OPENED");
                    inner.transition(CircuitState::Open, now)
                }
                CircuitState::Open => None,
            }
        };

        self.notify(transition);
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        let Some((from, to)) = transition else {
            return;
        };
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_transition(&self.config.name, from, to);
        }
    }

    fn force(&self, to: CircuitState) {
        let transition = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            let transition = inner.transition(to, now);
            match to {
                CircuitState::Closed => inner.consecutive_failures = 0,
                CircuitState::Open => inner.opened_at = Some(now),
                CircuitState::HalfOpen => {}
            }
            transition
        };
        info!(name = %self.config.name, state = %to, "Circuit breaker state forced");
        self.notify(transition);
    }

    /// Force the circuit closed and zero every counter, including totals.
    pub fn reset(&self) {
        self.force(CircuitState::Closed);
        self.total_calls.store(0, Ordering::Relaxed);
        self.total_successes.store(0, Ordering::Relaxed);
        self.total_failures.store(0, Ordering::Relaxed);
        self.total_rejections.store(0, Ordering::Relaxed);
    }

    /// Manually force the circuit open; the cooldown starts now.
    pub fn force_open(&self) {
        self.force(CircuitState::Open);
    }

    /// Manually force the circuit closed.
    pub fn force_close(&self) {
        self.force(CircuitState::Closed);
    }

    /// Snapshot of state, counters and timestamps.
    ///
    /// Reads the committed state without applying the lazy half-open check.
    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock();
        BreakerStats {
            name: self.config.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
            opened_at: inner.opened_at,
            last_failure_at: inner.last_failure_at,
            last_success_at: inner.last_success_at,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerStats {
    /// Circuit breaker name.
    pub name: String,
    /// Committed state.
    pub state: CircuitState,
    /// Consecutive failures observed while closed.
    pub consecutive_failures: u32,
    /// Successes observed in the current half-open episode.
    pub half_open_successes: u32,
    /// When the circuit last opened (set only while open).
    pub opened_at: Option<Instant>,
    /// Most recent failure.
    pub last_failure_at: Option<Instant>,
    /// Most recent success.
    pub last_success_at: Option<Instant>,
    /// Calls attempted, including rejected ones.
    pub total_calls: u64,
    /// Calls whose operation succeeded.
    pub total_successes: u64,
    /// Calls whose operation failed.
    pub total_failures: u64,
    /// Calls rejected without running the operation.
    pub total_rejections: u64,
}

impl BreakerStats {
    /// Calculate success rate (0.0 - 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            self.total_successes as f64 / self.total_calls as f64
        }
    }

    /// Calculate failure rate (0.0 - 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_calls as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn breaker(failures: u32, reset_ms: u64, successes: u32) -> Arc<CircuitBreaker> {
        CircuitBreaker::new(
            CircuitBreakerConfig::new("test")
                .failure_threshold(failures)
                .reset_timeout(Duration::from_millis(reset_ms))
                .success_threshold(successes),
        )
    }

    async fn fail(cb: &CircuitBreaker) {
        let _ = cb.call(|| async { Err::<(), _>("error") }).await;
    }

    async fn succeed(cb: &CircuitBreaker) {
        let _ = cb.call(|| async { Ok::<_, &str>(()) }).await;
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = breaker(3, 30_000, 2);
        assert_eq!(cb.state(), CircuitState::Closed);

        for _ in 0..3 {
            fail(&cb).await;
        }

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.stats().opened_at.is_some());
    }

    #[tokio::test]
    async fn test_open_circuit_does_not_invoke_operation() {
        let cb = breaker(1, 30_000, 1);
        fail(&cb).await;

        let invoked = AtomicU32::new(0);
        let result: Result<(), BreakerError<&str>> = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        match result {
            Err(BreakerError::Open(e)) => {
                assert_eq!(e.name, "test");
                assert_eq!(e.reason, OpenReason::Open);
                assert!(e.retry_after <= Duration::from_secs(30));
            }
            other => panic!("expected open rejection, got {:?}", other),
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(cb.stats().total_rejections, 1);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let cb = breaker(3, 30_000, 2);

        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.stats().consecutive_failures, 2);

        succeed(&cb).await;
        assert_eq!(cb.stats().consecutive_failures, 0);

        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_operation_error_is_passed_through() {
        let cb = breaker(5, 30_000, 2);
        let result: Result<(), BreakerError<String>> =
            cb.call(|| async { Err("upstream said no".to_string()) }).await;
        assert_eq!(result.unwrap_err().into_operation().as_deref(), Some("upstream said no"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_then_half_open_then_closed() {
        let cb = breaker(3, 1_000, 2);

        for _ in 0..3 {
            fail(&cb).await;
        }
        assert_eq!(cb.stats().state, CircuitState::Open);

        tokio::time::advance(Duration::from_millis(500)).await;
        let early: Result<(), BreakerError<&str>> = cb.call(|| async { Ok(()) }).await;
        assert!(early.unwrap_err().is_open());

        tokio::time::advance(Duration::from_millis(501)).await;
        let invoked = AtomicU32::new(0);
        let probe: Result<(), BreakerError<&str>> = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(probe.is_ok());
        assert_eq!(invoked.load(Ordering::SeqCst), 1);

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::HalfOpen);
        assert_eq!(stats.half_open_successes, 1);
        assert!(stats.opened_at.is_none());

        succeed(&cb).await;
        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.half_open_successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(1, 100, 3);
        fail(&cb).await;

        tokio::time::advance(Duration::from_millis(100)).await;
        succeed(&cb).await;
        succeed(&cb).await;
        assert_eq!(cb.stats().half_open_successes, 2);

        fail(&cb).await;
        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.half_open_successes, 0);
        assert!(stats.opened_at.is_some());

        // Cooldown restarts from the reopen.
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(!cb.is_call_permitted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_query_applies_cooldown() {
        let cb = breaker(1, 50, 2);
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(cb.stats().state, CircuitState::Open);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_limit() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new("probe")
                .failure_threshold(1)
                .reset_timeout(Duration::from_millis(10))
                .half_open_max_calls(1),
        );
        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(10)).await;

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let slow = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.call(|| async move {
                    let _ = wait.await;
                    Ok::<_, &str>(())
                })
                .await
            })
        };
        tokio::task::yield_now().await;

        let second: Result<(), BreakerError<&str>> = cb.call(|| async { Ok(()) }).await;
        assert_eq!(
            second.unwrap_err().open_error().map(|e| e.reason),
            Some(OpenReason::HalfOpenLimit)
        );

        let _ = release.send(());
        assert!(slow.await.unwrap().is_ok());
        assert!(cb.is_call_permitted());
    }

    /// Start a call that stays in flight until the returned sender fires.
    fn held_call(
        cb: &Arc<CircuitBreaker>,
        outcome: Result<(), &'static str>,
    ) -> (
        tokio::sync::oneshot::Sender<()>,
        tokio::task::JoinHandle<Result<(), BreakerError<&'static str>>>,
    ) {
        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let cb = cb.clone();
        let handle = tokio::spawn(async move {
            cb.call(|| async move {
                let _ = wait.await;
                outcome
            })
            .await
        });
        (release, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_half_open_success_does_not_close() {
        let cb = breaker(1, 100, 1);
        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let (release, stale) = held_call(&cb, Ok(()));
        tokio::task::yield_now().await;

        // A second probe fails and the circuit re-opens, then cools down again.
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let _ = release.send(());
        assert!(stale.await.unwrap().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.stats().half_open_successes, 0);

        succeed(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_half_open_failure_does_not_reopen() {
        let cb = breaker(1, 100, 2);
        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let (release, stale) = held_call(&cb, Err("late"));
        tokio::task::yield_now().await;

        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await;

        let _ = release.send(());
        assert!(matches!(stale.await.unwrap(), Err(BreakerError::Operation("late"))));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.stats().half_open_successes, 1);

        succeed(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_while_open_are_ignored() {
        let cb = breaker(1, 1_000, 1);
        let (release_ok, late_ok) = held_call(&cb, Ok(()));
        let (release_err, late_err) = held_call(&cb, Err("late"));
        tokio::task::yield_now().await;

        fail(&cb).await;
        let opened_at = cb.stats().opened_at;
        assert!(opened_at.is_some());

        tokio::time::advance(Duration::from_millis(400)).await;
        let _ = release_ok.send(());
        let _ = release_err.send(());
        assert!(late_ok.await.unwrap().is_ok());
        assert!(late_err.await.unwrap().is_err());

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.opened_at, opened_at);
        assert_eq!(stats.consecutive_failures, 1);
        assert_eq!(stats.total_successes, 1);
        assert_eq!(stats.total_failures, 2);

        // Cooldown still counts from the original opening.
        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_fallback_only_on_open() {
        let cb = breaker(1, 30_000, 1);

        let passthrough = cb
            .call_with_fallback(|| async { Err::<u32, _>("real failure") }, || async { Ok(0) })
            .await;
        assert_eq!(passthrough, Err("real failure"));

        let fallback = cb
            .call_with_fallback(|| async { Ok::<u32, &str>(1) }, || async { Ok(42) })
            .await;
        assert_eq!(fallback, Ok(42));
    }

    #[derive(Debug, PartialEq)]
    enum ApiError {
        Unavailable(String),
        Upstream,
    }

    impl From<CircuitOpenError> for ApiError {
        fn from(e: CircuitOpenError) -> Self {
            ApiError::Unavailable(e.name)
        }
    }

    #[tokio::test]
    async fn test_execute_converts_rejection() {
        let cb = breaker(1, 30_000, 1);
        let first = cb.execute(|| async { Err::<(), _>(ApiError::Upstream) }).await;
        assert_eq!(first, Err(ApiError::Upstream));

        let second = cb.execute(|| async { Ok::<(), ApiError>(()) }).await;
        assert_eq!(second, Err(ApiError::Unavailable("test".to_string())));
    }

    #[tokio::test]
    async fn test_manual_overrides() {
        let cb = breaker(2, 30_000, 1);

        cb.force_open();
        assert_eq!(cb.stats().state, CircuitState::Open);
        assert!(!cb.is_call_permitted());

        cb.force_close();
        assert_eq!(cb.stats().state, CircuitState::Closed);
        assert!(cb.is_call_permitted());

        fail(&cb).await;
        cb.reset();
        let stats = cb.stats();
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.total_calls, 0);
        assert_eq!(stats.total_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_open_restarts_cooldown() {
        let cb = breaker(1, 100, 1);
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(60)).await;
        cb.force_open();
        assert_eq!(cb.stats().opened_at, Some(Instant::now()));

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(!cb.is_call_permitted());
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_listener_sees_transitions() {
        let cb = breaker(1, 30_000, 1);
        let seen: Arc<Mutex<Vec<(String, CircuitState, CircuitState)>>> = Arc::default();
        let sink = seen.clone();
        cb.add_listener(Arc::new(move |name: &str, from: CircuitState, to: CircuitState| {
            sink.lock().push((name.to_string(), from, to));
        }));

        fail(&cb).await;
        cb.reset();

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                ("test".to_string(), CircuitState::Closed, CircuitState::Open),
                ("test".to_string(), CircuitState::Open, CircuitState::Closed),
            ]
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        assert!(CircuitBreakerConfig::default().failure_threshold(0).validate().is_err());
        assert!(CircuitBreakerConfig::default().success_threshold(0).validate().is_err());
        assert!(CircuitBreakerConfig::default().reset_timeout(Duration::ZERO).validate().is_err());
        assert!(CircuitBreaker::try_new(CircuitBreakerConfig::default().failure_threshold(0)).is_err());
    }

    #[test]
    fn test_default_config_values() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.reset_timeout, Duration::from_secs(60));
        assert_eq!(config.half_open_max_calls, None);
    }

    #[test]
    fn test_stats_rates() {
        let stats = BreakerStats {
            name: "x".into(),
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
            last_failure_at: None,
            last_success_at: None,
            total_calls: 4,
            total_successes: 3,
            total_failures: 1,
            total_rejections: 0,
        };
        assert_eq!(stats.success_rate(), 0.75);
        assert_eq!(stats.failure_rate(), 0.25);
    }
}
