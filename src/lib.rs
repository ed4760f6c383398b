// Rampart - resilience middleware for calls to downstream dependencies
//
// Circuit breaking, fixed-window rate limiting, retry with exponential
// backoff and TTL caching, usable on their own or composed through `Guard`.

mod guard;

pub use guard::{Guard, GuardBuilder, GuardError};

// Re-export component crates
pub use rampart_cache::{self, CacheConfig, CacheError, CacheKey, CacheResult, CacheStats, TtlCache};
pub use rampart_core::{self, *};
pub use rampart_ratelimit::{
    self, KeyExtractor, Preset, RateLimitCheckResult, RateLimitConfig, RateLimitError, RateLimitHeaders,
    RateLimitResult, RateLimiter, RequestInfo, WindowConfig,
};

#[cfg(feature = "config")]
pub use rampart_config;

#[cfg(feature = "log")]
pub use rampart_log;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        BreakerError,
        BreakerRegistry,
        CacheKey,
        CircuitBreaker,
        CircuitBreakerConfig,
        CircuitOpenError,
        CircuitState,
        Guard,
        GuardError,
        Preset,
        RateLimitConfig,
        RateLimitError,
        RateLimiter,
        RequestInfo,
        Retry,
        RetryConfig,
        RetryError,
        RetryResult,
        TtlCache,
        WindowConfig,
        run_with_retry,
    };
}
