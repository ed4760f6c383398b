//! # Rampart Rate Limiting
//!
//! Fixed-window request counting per logical key.
//!
//! ## Features
//!
//! - **Fixed Window**: Each key gets a window that starts on its first request
//!   and resets wholesale when it ends
//! - **Per-call Overrides**: One limiter can enforce different windows per route
//! - **Key Extraction**: By forwarded client address, user ID, API key, header,
//!   or custom function, always with an anonymous fallback bucket
//! - **Presets**: Strict, standard, lenient, per-user and elevated policies
//!   selected from the request path
//! - **Standard Headers**: `X-RateLimit-Limit`, `X-RateLimit-Remaining`,
//!   `X-RateLimit-Reset`, `Retry-After`
//!
//! A fixed window admits up to `2 * max` requests across a window boundary
//! (a full window's worth just before the reset and another just after).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rampart_ratelimit::RateLimiter;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = RateLimiter::builder()
//!     .fixed_window(60, Duration::from_secs(60))
//!     .build()?;
//!
//! let result = limiter.admit("203.0.113.9", None);
//! if result.allowed {
//!     println!("Request allowed, {} remaining", result.remaining);
//! } else {
//!     println!("Rate limited, retry after {}s", result.retry_after_secs());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod extractor;
pub mod presets;
pub mod stores;

pub use config::{RateLimitConfig, RateLimiterBuilder, WindowConfig};
pub use error::{
    LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER, RETRY_AFTER_HEADER, RateLimitError, RateLimitHeaders, RateLimitResult,
};
pub use extractor::{KeyExtractor, KeyExtractorFn, RequestInfo};
pub use presets::Preset;
pub use rampart_core::SweeperHandle;
pub use stores::{MemoryStore, RateLimitStore, WindowDecision};

use rampart_core::error::ceil_secs;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitCheckResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Number of remaining requests in the current window
    pub remaining: u64,
    /// Maximum number of requests allowed
    pub limit: u64,
    /// Time until the current window resets
    pub reset_after: Duration,
    /// Time to wait before retrying (only when denied)
    pub retry_after: Option<Duration>,
}

impl RateLimitCheckResult {
    /// Create a new allowed result
    pub fn allowed(remaining: u64, limit: u64, reset_after: Duration) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            reset_after,
            retry_after: None,
        }
    }

    /// Create a new denied result
    pub fn denied(limit: u64, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            reset_after: retry_after,
            retry_after: Some(retry_after),
        }
    }

    /// Whole seconds until the client may retry; 0 when allowed.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after.map(ceil_secs).unwrap_or(0)
    }

    /// Headers describing this result
    pub fn headers(&self) -> RateLimitHeaders {
        let reset = ceil_secs(self.reset_after);
        if self.allowed {
            RateLimitHeaders::allowed(self.limit, self.remaining, reset)
        } else {
            RateLimitHeaders::denied(self.limit, reset, self.retry_after_secs())
        }
    }
}

/// The main rate limiter
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter builder
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::new()
    }

    /// Create a rate limiter backed by a fresh in-memory store
    pub fn new(config: RateLimitConfig) -> RateLimitResult<Self> {
        config.validate()?;
        Ok(Self::with_store(Arc::new(MemoryStore::new()), config))
    }

    /// Create a limiter over an existing store
    pub fn with_store(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        debug!(
            window = ?config.window.window,
            max_requests = config.window.max_requests,
            key_prefix = ?config.key_prefix,
            "Creating new rate limiter"
        );
        Self { store, config }
    }

    /// Create a limiter for a preset policy
    pub fn preset(preset: Preset) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), preset.config())
    }

    /// Record a request for `key` and decide whether it is allowed.
    ///
    /// `override_window` replaces the configured window for this call only.
    /// Never suspends.
    pub fn admit(&self, key: &str, override_window: Option<WindowConfig>) -> RateLimitCheckResult {
        let window = override_window.unwrap_or(self.config.window);
        let max = window.max_requests.max(1);
        let now = Instant::now();

        let decision = self
            .store
            .fixed_window_check(&self.config.storage_key(key), window, now);
        let reset_after = decision.reset_at.saturating_duration_since(now);

        if decision.count <= max {
            let remaining = max - decision.count;
            trace!(key = %key, remaining, "Rate limit: request allowed");
            RateLimitCheckResult::allowed(remaining, max, reset_after)
        } else {
            warn!(
                key = %key,
                count = decision.count,
                limit = max,
                retry_after_secs = ceil_secs(reset_after),
                "Rate limit: request denied"
            );
            RateLimitCheckResult::denied(max, reset_after)
        }
    }

    /// Like [`admit`](Self::admit) with the configured window, returning an
    /// error on rejection.
    pub fn check(&self, key: &str) -> RateLimitResult<RateLimitCheckResult> {
        let result = self.admit(key, None);
        if result.allowed {
            Ok(result)
        } else {
            Err(RateLimitError::limit_exceeded(
                key,
                result.limit,
                result.retry_after.unwrap_or_default(),
            ))
        }
    }

    /// Admit a request, deriving its key with the configured extractor.
    pub fn admit_request(&self, request: &RequestInfo) -> (String, RateLimitCheckResult) {
        let key = self.config.extractor.key_for(request);
        let result = self.admit(&key, None);
        (key, result)
    }

    /// Get the configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Reset the rate limit for a key
    pub fn reset(&self, key: &str) -> bool {
        self.store.reset(&self.config.storage_key(key))
    }

    /// Number of keys currently tracked by the store
    pub fn key_count(&self) -> usize {
        self.store.key_count()
    }

    /// Remove keys whose window has ended. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let removed = self.store.sweep(Instant::now());
        debug!(removed, remaining = self.store.key_count(), "Rate limit sweep complete");
        removed
    }

    /// Sweep expired keys every `interval` in a background task.
    ///
    /// The task stops when the handle or the limiter is dropped. Must be
    /// called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        rampart_core::spawn_sweeper(self, interval, |limiter: &RateLimiter| {
            limiter.sweep();
        })
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.store_type())
            .field("config", &self.config)
            .finish()
    }
}
