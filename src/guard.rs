//! Composition of the four resilience layers around one dependency.
//!
//! A guarded call runs the layers outermost first:
//!
//! 1. the rate limiter admits or rejects the caller's key;
//! 2. the cache answers from a fresh entry when one exists;
//! 3. the retry executor drives attempts, each through the circuit breaker.
//!
//! Open-circuit rejections are never retried.

use http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use http::StatusCode;
use rampart_cache::TtlCache;
use rampart_core::{BreakerError, CircuitBreaker, CircuitOpenError, Retry, RetryConfig, RetryError};
use rampart_ratelimit::{RateLimitError, RateLimiter};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a guarded call did not produce a value.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// The caller exceeded its rate limit; nothing ran.
    #[error(transparent)]
    RateLimited(RateLimitError),
    /// The breaker is open; the dependency was not called.
    #[error(transparent)]
    CircuitOpen(CircuitOpenError),
    /// Every attempt failed.
    #[error("{0}")]
    Exhausted(RetryError<E>),
}

impl<E> GuardError<E> {
    /// Status a service should answer its own caller with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited(e) if e.is_limit_exceeded() => StatusCode::TOO_MANY_REQUESTS,
            Self::RateLimited(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Exhausted(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// `Retry-After` and rate limit headers for the response.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            Self::RateLimited(e) => {
                let pairs = e.headers().map(|h| h.to_header_pairs()).unwrap_or_default();
                for (name, value) in pairs {
                    if let (Ok(name), Ok(value)) =
                        (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value))
                    {
                        headers.insert(name, value);
                    }
                }
            }
            Self::CircuitOpen(e) => {
                headers.insert(RETRY_AFTER, HeaderValue::from(e.retry_after_secs()));
            }
            Self::Exhausted(_) => {}
        }
        headers
    }

    /// Number of dependency attempts made, 0 when nothing ran.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted(e) => e.attempts,
            _ => 0,
        }
    }

    /// The dependency's last error, when it ran and failed.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted(e) => Some(e.last_error),
            _ => None,
        }
    }
}

/// Resilience pipeline protecting one dependency.
///
/// ```rust,no_run
/// use rampart::prelude::*;
/// use std::time::Duration;
///
/// # async fn demo() {
/// let guard: Guard<String> = Guard::builder(CircuitBreaker::new(CircuitBreakerConfig::new("profiles")))
///     .retry(RetryConfig::new(3).initial_delay(Duration::from_millis(200)))
///     .limiter(RateLimiter::preset(Preset::Standard))
///     .cache(TtlCache::new())
///     .build();
///
/// let profile = guard
///     .run_cached("203.0.113.7", "profiles:user:42", Duration::from_secs(30), || async {
///         Ok::<_, std::io::Error>("jane".to_string())
///     })
///     .await;
/// # }
/// ```
pub struct Guard<T> {
    breaker: Arc<CircuitBreaker>,
    retry: Retry,
    limiter: Option<Arc<RateLimiter>>,
    cache: Option<Arc<TtlCache<T>>>,
}

impl<T> Guard<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start a guard around `breaker`, with default retries and no limiter or cache.
    pub fn builder(breaker: Arc<CircuitBreaker>) -> GuardBuilder<T> {
        GuardBuilder {
            breaker,
            retry: Retry::default(),
            limiter: None,
            cache: None,
        }
    }

    /// The breaker every attempt runs through.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The retry executor.
    pub fn retry(&self) -> &Retry {
        &self.retry
    }

    /// The rate limiter, if one was configured.
    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// The result cache, if one was configured.
    pub fn cache(&self) -> Option<&Arc<TtlCache<T>>> {
        self.cache.as_ref()
    }

    /// Rate limit `rate_key`, then run `op` with retries through the breaker.
    pub async fn run<F, Fut, E>(&self, rate_key: &str, op: F) -> Result<T, GuardError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        self.admit(rate_key)?;
        self.protected(&op).await
    }

    /// Like [`run`](Self::run), answering from the cache when `cache_key` is
    /// fresh and caching a successful result for `ttl`.
    ///
    /// Without a configured cache this is the same as `run`.
    pub async fn run_cached<F, Fut, E>(
        &self,
        rate_key: &str,
        cache_key: &str,
        ttl: Duration,
        op: F,
    ) -> Result<T, GuardError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        self.admit(rate_key)?;
        match &self.cache {
            Some(cache) => cache.get_or_compute(cache_key, ttl, || self.protected(&op)).await,
            None => self.protected(&op).await,
        }
    }

    fn admit<E>(&self, rate_key: &str) -> Result<(), GuardError<E>> {
        if let Some(limiter) = &self.limiter {
            limiter.check(rate_key).map_err(GuardError::RateLimited)?;
        }
        Ok(())
    }

    async fn protected<F, Fut, E>(&self, op: &F) -> Result<T, GuardError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        let breaker = &self.breaker;
        let result = self
            .retry
            .run_if(move || breaker.call(move || op()), |e: &BreakerError<E>| !e.is_open())
            .await;

        let attempts = result.attempts;
        result.outcome.map_err(|e| match e {
            BreakerError::Open(open) => GuardError::CircuitOpen(open),
            BreakerError::Operation(last_error) => GuardError::Exhausted(RetryError { last_error, attempts }),
        })
    }
}

#[cfg(feature = "config")]
impl<T> Guard<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Guard for dependency `name` built from loaded settings, with a limiter
    /// and cache of its own.
    pub fn from_settings(
        name: impl Into<String>,
        settings: &rampart_config::ResilienceSettings,
    ) -> rampart_config::ConfigResult<Self> {
        use rampart_config::Validate;

        settings.validate()?;
        let limiter = RateLimiter::new(settings.rate_limit_config()?)?;
        let cache = TtlCache::with_config(settings.cache_config())?;

        Ok(Self::builder(CircuitBreaker::try_new(settings.breaker_config(name))?)
            .retry(settings.retry_config())
            .limiter(Arc::new(limiter))
            .cache(Arc::new(cache))
            .build())
    }
}

/// Builder for [`Guard`].
pub struct GuardBuilder<T> {
    breaker: Arc<CircuitBreaker>,
    retry: Retry,
    limiter: Option<Arc<RateLimiter>>,
    cache: Option<Arc<TtlCache<T>>>,
}

impl<T> GuardBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Retry policy for failed attempts.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Retry::new(config);
        self
    }

    /// Rate limit callers before anything else runs.
    pub fn limiter(mut self, limiter: impl Into<Arc<RateLimiter>>) -> Self {
        self.limiter = Some(limiter.into());
        self
    }

    /// Cache used by [`Guard::run_cached`]. May be shared with other guards.
    pub fn cache(mut self, cache: impl Into<Arc<TtlCache<T>>>) -> Self {
        self.cache = Some(cache.into());
        self
    }

    /// Finish the guard.
    pub fn build(self) -> Guard<T> {
        Guard {
            breaker: self.breaker,
            retry: self.retry,
            limiter: self.limiter,
            cache: self.cache,
        }
    }
}
