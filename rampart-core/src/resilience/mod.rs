//! # Resilience Patterns
//!
//! ## Patterns Included
//!
//! - **Circuit Breaker**: Prevent cascade failures by failing fast
//! - **Retry**: Capped exponential backoff around a fallible operation
//! - **Classification**: Decide which errors are worth retrying
//!
//! The breaker is normally the innermost wrapper and retry wraps it:
//!
//! ```rust,ignore
//! let result = retry.run(|| breaker.call(|| client.fetch(id))).await;
//! ```

mod circuit_breaker;
mod classify;
mod registry;
mod retry;

pub use circuit_breaker::*;
pub use classify::*;
pub use registry::*;
pub use retry::*;
