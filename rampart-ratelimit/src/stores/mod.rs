//! Rate limit storage backends
//!
//! A store owns the per-key window counters. The in-memory [`MemoryStore`] is
//! the only backend; state is local to the process.

mod memory;

pub use memory::MemoryStore;

use crate::config::WindowConfig;
use tokio::time::Instant;

/// Counter state after recording one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDecision {
    /// Requests recorded in the current window, including this one
    pub count: u64,
    /// When the current window ends
    pub reset_at: Instant,
}

/// Trait for rate limit storage backends
///
/// Implementations must make each call atomic per key: concurrent
/// `fixed_window_check` calls on one key observe strictly increasing counts.
pub trait RateLimitStore: Send + Sync {
    /// Record a request for `key` in its fixed window.
    ///
    /// Starts a fresh window with a count of 1 when the key is unknown or its
    /// window has ended; otherwise increments the count, even past the limit.
    fn fixed_window_check(&self, key: &str, window: WindowConfig, now: Instant) -> WindowDecision;

    /// Forget `key`. Returns whether it was tracked.
    fn reset(&self, key: &str) -> bool;

    /// Drop every key whose window ended at or before `now`. Returns how many.
    fn sweep(&self, now: Instant) -> usize;

    /// Number of tracked keys
    fn key_count(&self) -> usize;

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}
