//! Retry pattern with capped exponential backoff.
//!
//! The delay before retry `n` (1-based) is
//! `min(initial_delay * backoff_multiplier^(n-1), max_delay)`, so the defaults
//! wait 1s, 2s, 4s, 8s, 10s, 10s, ...
//!
//! Exhaustion is not an error: [`Retry::run`] returns a [`RetryResult`] that
//! records whether the operation succeeded, how many attempts it took and the
//! last error seen. Use [`RetryResult::into_result`] to get a `Result` back.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rampart_core::{Retry, RetryConfig};
//! use std::time::Duration;
//!
//! let retry = Retry::new(
//!     RetryConfig::new(5)
//!         .initial_delay(Duration::from_millis(200))
//!         .max_delay(Duration::from_secs(5)),
//! );
//!
//! let result = retry.run(|| external_service.fetch()).await;
//! match result.into_result() {
//!     Ok(data) => render(data),
//!     Err(e) => tracing::warn!(attempts = e.attempts, "giving up"),
//! }
//! ```

use crate::error::ConfigError;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Observability hook invoked before each backoff wait with the attempt
/// number that just failed and its error.
pub type RetryHook = Arc<dyn Fn(u32, &dyn Debug) + Send + Sync>;

/// Retry configuration.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// Called before each wait; never affects control flow.
    pub on_retry: Option<RetryHook>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            on_retry: None,
        }
    }
}

impl Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryConfig {
    /// Create new retry configuration.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set the delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Register the retry hook.
    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(u32, &dyn Debug) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Check the configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::new("retry", "max_retries must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::new("retry", "backoff_multiplier must be a finite value >= 1.0"));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::new("retry", "max_delay must not be shorter than initial_delay"));
        }
        Ok(())
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// Number of attempts made, between 1 and `max_retries`.
    pub attempts: u32,
    /// The successful value, or the last error if every attempt failed.
    pub outcome: Result<T, E>,
}

impl<T, E> RetryResult<T, E> {
    /// Whether an attempt succeeded.
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The value produced by the successful attempt.
    pub fn data(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// The error from the last attempt, if all attempts failed.
    pub fn last_error(&self) -> Option<&E> {
        self.outcome.as_ref().err()
    }

    /// Consume into the value, discarding any error.
    pub fn into_data(self) -> Option<T> {
        self.outcome.ok()
    }

    /// Convert exhaustion into a [`RetryError`].
    pub fn into_result(self) -> Result<T, RetryError<E>> {
        let attempts = self.attempts;
        self.outcome
            .map_err(|last_error| RetryError { last_error, attempts })
    }
}

/// Every attempt failed.
#[derive(Debug, Error)]
#[error("Failed after {attempts} attempts: {last_error}")]
pub struct RetryError<E> {
    /// Last error encountered.
    pub last_error: E,
    /// Number of attempts made.
    pub attempts: u32,
}

/// Retry executor.
#[derive(Debug, Clone, Default)]
pub struct Retry {
    config: RetryConfig,
}

impl Retry {
    /// Create a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a new retry executor, validating the configuration.
    pub fn try_new(config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `f` until it succeeds or the attempt budget is spent.
    ///
    /// Every error is retried; see [`run_if`](Self::run_if) for selective
    /// retries.
    pub async fn run<F, Fut, T, E>(&self, f: F) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        self.run_if(f, |_| true).await
    }

    /// Run `f`, stopping early at the first error `should_retry` rejects.
    pub async fn run_if<F, Fut, T, E, P>(&self, mut f: F, should_retry: P) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(data) => {
                    if attempt > 1 {
                        debug!(attempt, "Retry succeeded");
                    }
                    return RetryResult {
                        attempts: attempt,
                        outcome: Ok(data),
                    };
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        warn!(
                            attempt,
                            max_attempts,
                            error = ?e,
                            "Final retry attempt failed"
                        );
                        return RetryResult {
                            attempts: attempt,
                            outcome: Err(e),
                        };
                    }

                    if !should_retry(&e) {
                        debug!(attempt, error = ?e, "Error is not retryable");
                        return RetryResult {
                            attempts: attempt,
                            outcome: Err(e),
                        };
                    }

                    let delay = self.config.delay_for_attempt(attempt);
                    debug!(
                        attempt,
                        delay = ?delay,
                        error = ?e,
                        "Retry attempt failed, waiting before retry"
                    );

                    if let Some(hook) = &self.config.on_retry {
                        hook(attempt, &e);
                    }

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Run `f` with the given configuration.
pub async fn run_with_retry<F, Fut, T, E>(f: F, config: RetryConfig) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Debug,
{
    Retry::new(config).run(f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn no_delay(max_retries: u32) -> RetryConfig {
        RetryConfig::new(max_retries)
            .initial_delay(Duration::ZERO)
            .max_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_first_try() {
        let result = Retry::new(no_delay(3)).run(|| async { Ok::<_, &str>(42) }).await;

        assert!(result.success());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.data(), Some(&42));
        assert!(result.last_error().is_none());
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_second_try() {
        let attempts = AtomicU32::new(0);

        let result = Retry::new(no_delay(3))
            .run(|| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move { if attempt == 0 { Err("first failure") } else { Ok(42) } }
            })
            .await;

        assert_eq!(result.attempts, 2);
        assert_eq!(result.into_data(), Some(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let result = run_with_retry(|| async { Err::<i32, _>("always fails") }, no_delay(3)).await;

        assert!(!result.success());
        assert_eq!(result.attempts, 3);
        assert_eq!(result.last_error(), Some(&"always fails"));

        let err = result.into_result().unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.to_string(), "Failed after 3 attempts: always fails");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_are_exponential_and_capped() {
        let started = Instant::now();
        let stamps = Mutex::new(Vec::new());

        let config = RetryConfig::new(5)
            .initial_delay(Duration::from_millis(1000))
            .max_delay(Duration::from_millis(10_000))
            .backoff_multiplier(2.0);

        let result = run_with_retry(
            || {
                stamps.lock().push(started.elapsed());
                async { Err::<(), _>("down") }
            },
            config,
        )
        .await;

        assert_eq!(result.attempts, 5);
        let stamps = stamps.lock();
        let gaps: Vec<u128> = stamps.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
        assert_eq!(gaps, vec![1000, 2000, 4000, 8000]);
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(10_000));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_on_retry_hook_sees_each_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let config = no_delay(3).on_retry(move |attempt, err| {
            sink.lock().push(format!("{attempt}:{err:?}"));
        });

        let result = run_with_retry(|| async { Err::<(), _>("nope") }, config).await;

        assert_eq!(result.attempts, 3);
        // No hook after the final attempt.
        assert_eq!(*seen.lock(), vec!["1:\"nope\"".to_string(), "2:\"nope\"".to_string()]);
    }

    #[tokio::test]
    async fn test_run_if_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);

        let result = Retry::new(no_delay(5))
            .run_if(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("404 not found") }
                },
                |e: &&str| !e.contains("404"),
            )
            .await;

        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Dependency error with no `Display` impl.
    #[derive(Debug, PartialEq)]
    struct Opaque {
        code: u16,
    }

    #[tokio::test]
    async fn test_opaque_errors_are_retried() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let config = no_delay(2).on_retry(move |attempt, err| {
            sink.lock().push(format!("{attempt}:{err:?}"));
        });

        let result = Retry::new(config)
            .run(|| async { Err::<(), _>(Opaque { code: 503 }) })
            .await;

        assert_eq!(result.attempts, 2);
        assert_eq!(result.outcome, Err(Opaque { code: 503 }));
        assert_eq!(*seen.lock(), vec!["1:Opaque { code: 503 }".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_budget_still_attempts_once() {
        let result = run_with_retry(|| async { Err::<(), _>("x") }, no_delay(0)).await;
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(RetryConfig::new(0).validate().is_err());
        assert!(RetryConfig::default().backoff_multiplier(0.5).validate().is_err());
        assert!(RetryConfig::default().backoff_multiplier(f64::NAN).validate().is_err());
        assert!(
            RetryConfig::default()
                .initial_delay(Duration::from_secs(20))
                .validate()
                .is_err()
        );
        assert!(Retry::try_new(RetryConfig::new(0)).is_err());
    }
}
