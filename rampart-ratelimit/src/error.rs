//! Error types for rate limiting

use rampart_core::error::ceil_secs;
use std::time::Duration;
use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

fn whole_secs(duration: &Duration) -> u64 {
    ceil_secs(*duration)
}

/// Errors raised by the rate limiter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Rate limit exceeded; no downstream call was attempted.
    #[error("Rate limit exceeded for '{key}'. Retry after {}s", whole_secs(.retry_after))]
    LimitExceeded {
        /// The caller's key that was rejected
        key: String,
        /// Total limit for the window
        limit: u64,
        /// Time until the window resets
        retry_after: Duration,
    },

    /// The limiter was built with an invalid setting
    #[error("Invalid rate limit configuration: {0}")]
    Config(String),
}

impl RateLimitError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn limit_exceeded(key: impl Into<String>, limit: u64, retry_after: Duration) -> Self {
        Self::LimitExceeded {
            key: key.into(),
            limit,
            retry_after,
        }
    }

    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Remaining window time for rejections
    pub fn retry_after(&self) -> Option<Duration> {
        if let Self::LimitExceeded { retry_after, .. } = self {
            Some(*retry_after)
        } else {
            None
        }
    }

    /// Retry-after rounded up to whole seconds
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().map(ceil_secs)
    }

    /// Headers for a 429 response; `None` for configuration errors
    pub fn headers(&self) -> Option<RateLimitHeaders> {
        let Self::LimitExceeded { limit, retry_after, .. } = self else {
            return None;
        };
        let secs = ceil_secs(*retry_after);
        Some(RateLimitHeaders::denied(*limit, secs, secs))
    }
}

/// `X-RateLimit-Limit`
pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
/// `X-RateLimit-Remaining`
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
/// `X-RateLimit-Reset`, in seconds until the window resets
pub const RESET_HEADER: &str = "X-RateLimit-Reset";
/// `Retry-After`, in seconds
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Header values describing a limiter decision, all in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
    /// Only present on rejections
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    pub fn allowed(limit: u64, remaining: u64, reset: u64) -> Self {
        Self {
            limit,
            remaining,
            reset,
            retry_after: None,
        }
    }

    pub fn denied(limit: u64, reset: u64, retry_after: u64) -> Self {
        Self {
            limit,
            remaining: 0,
            reset,
            retry_after: Some(retry_after),
        }
    }

    /// `(name, value)` pairs ready to attach to a response
    pub fn to_header_pairs(&self) -> Vec<(&'static str, String)> {
        [
            (LIMIT_HEADER, Some(self.limit)),
            (REMAINING_HEADER, Some(self.remaining)),
            (RESET_HEADER, Some(self.reset)),
            (RETRY_AFTER_HEADER, self.retry_after),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v.to_string())))
        .collect()
    }
}
