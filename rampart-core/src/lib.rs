//! # Rampart Core
//!
//! Failure-handling primitives that wrap calls to unreliable dependencies.
//!
//! - **Circuit Breaker**: fail fast while a dependency is presumed unhealthy,
//!   probe for recovery after a cooldown
//! - **Retry**: re-run a fallible operation with capped exponential backoff
//! - **Registry**: one breaker per named dependency, owned by the caller
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rampart_core::{CircuitBreaker, CircuitBreakerConfig, RetryConfig, run_with_retry};
//! use std::time::Duration;
//!
//! # async fn fetch() -> Result<String, std::io::Error> { Ok(String::new()) }
//! # async fn example() {
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::new("profile-db")
//!         .failure_threshold(5)
//!         .reset_timeout(Duration::from_secs(60)),
//! );
//!
//! let result = run_with_retry(|| breaker.call(fetch), RetryConfig::default()).await;
//! if !result.success() {
//!     tracing::warn!(attempts = result.attempts, "profile lookup gave up");
//! }
//! # }
//! ```

pub mod error;
pub mod resilience;
pub mod sweeper;

pub use error::{BreakerError, BreakerResult, CircuitOpenError, ConfigError, OpenReason};
pub use resilience::*;
pub use sweeper::{SweeperHandle, spawn_sweeper};
