//! In-memory rate limit store
//!
//! Uses DashMap for thread-safe concurrent access. Operations on one key are
//! serialized by the map's shard lock; different keys rarely contend.

use crate::config::WindowConfig;
use crate::stores::{RateLimitStore, WindowDecision};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Fixed window state
#[derive(Debug, Clone)]
struct FixedWindowState {
    count: u64,
    window_reset_at: Instant,
}

/// In-memory rate limit store
#[derive(Debug, Default)]
pub struct MemoryStore {
    fixed_windows: DashMap<String, FixedWindowState>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        debug!("Creating new in-memory rate limit store");
        Self::default()
    }
}

impl RateLimitStore for MemoryStore {
    fn fixed_window_check(&self, key: &str, window: WindowConfig, now: Instant) -> WindowDecision {
        let mut entry = self
            .fixed_windows
            .entry(key.to_string())
            .or_insert_with(|| FixedWindowState {
                count: 0,
                window_reset_at: now,
            });

        if now >= entry.window_reset_at {
            entry.count = 1;
            entry.window_reset_at = now + window.window;
        } else {
            entry.count = entry.count.saturating_add(1);
        }

        trace!(key = %key, count = entry.count, "Fixed window check");
        WindowDecision {
            count: entry.count,
            reset_at: entry.window_reset_at,
        }
    }

    fn reset(&self, key: &str) -> bool {
        debug!(key = %key, "Resetting rate limit state");
        self.fixed_windows.remove(key).is_some()
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.fixed_windows.len();
        self.fixed_windows.retain(|_, state| state.window_reset_at > now);
        before.saturating_sub(self.fixed_windows.len())
    }

    fn key_count(&self) -> usize {
        self.fixed_windows.len()
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
