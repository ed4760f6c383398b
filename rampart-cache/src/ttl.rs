//! In-process TTL cache.

use crate::config::CacheConfig;
use crate::error::CacheResult;
use dashmap::DashMap;
use rampart_core::SweeperHandle;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    stored_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups that found a fresh entry
    pub hits: u64,
    /// Lookups that found nothing or a stale entry
    pub misses: u64,
    /// Entries physically stored, including stale ones not yet evicted
    pub size: usize,
    /// `hits / (hits + misses)`, 0 before the first lookup
    pub hit_rate: f64,
}

/// Key/value cache where every entry carries its own time-to-live.
///
/// An entry is fresh while `now - stored_at < ttl`. Stale entries are treated
/// as absent and are evicted by the lookup that notices them, by
/// [`purge_expired`](Self::purge_expired) or by a background sweeper.
///
/// ```rust,no_run
/// use rampart_cache::TtlCache;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), std::io::Error> {
/// let cache: TtlCache<String> = TtlCache::new();
/// let summary = cache
///     .get_or_compute("ai:summary:42", Duration::from_secs(300), || async {
///         Ok::<_, std::io::Error>("expensive result".to_string())
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TtlCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> TtlCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty cache with default configuration.
    pub fn new() -> Self {
        Self::build(CacheConfig::default())
    }

    /// Create an empty cache, validating `config`.
    pub fn with_config(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a fresh value, recording a hit or a miss.
    ///
    /// A stale entry counts as a miss and is evicted.
    pub fn get(&self, key: &str) -> Option<T> {
        let stored_key = self.config.build_key(key);
        let now = Instant::now();

        let fresh = self
            .entries
            .get(&stored_key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.data.clone());

        match fresh {
            Some(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "Cache hit");
                Some(data)
            }
            None => {
                self.entries.remove_if(&stored_key, |_, entry| !entry.is_fresh(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: &str, value: T, ttl: Duration) {
        let entry = CacheEntry {
            data: value,
            stored_at: Instant::now(),
            ttl,
        };
        self.entries.insert(self.config.build_key(key), entry);
        trace!(key = %key, ttl = ?ttl, "Cache set");
    }

    /// Return the cached value, or run `compute` once and cache its result.
    ///
    /// Errors from `compute` are returned as is and nothing is cached.
    /// Concurrent misses on the same key each run their own `compute`.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, ttl: Duration, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Whether a fresh entry exists. Does not touch statistics.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(&self.config.build_key(key))
            .is_some_and(|entry| entry.is_fresh(now))
    }

    /// Remove one entry. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(&self.config.build_key(key)).is_some()
    }

    /// Remove every entry whose key contains `pattern`. Returns how many.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|stored_key, _| {
            let matches = self.config.caller_key(stored_key).contains(pattern);
            if matches {
                removed += 1;
            }
            !matches
        });
        debug!(pattern = %pattern, removed, "Cache invalidated");
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.clear();
        debug!("Cache cleared");
    }

    /// Remove stale entries. Returns how many.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let fresh = entry.is_fresh(now);
            if !fresh {
                removed += 1;
            }
            fresh
        });
        debug!(removed, remaining = self.entries.len(), "Cache sweep complete");
        removed
    }

    /// Number of entries physically stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of hit/miss counters and size.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.entries.len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Zero the hit/miss counters.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Purge stale entries every `sweep_interval` in a background task.
    ///
    /// The task stops when the handle or the cache is dropped. Must be called
    /// from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        rampart_core::spawn_sweeper(self, self.config.sweep_interval, |cache: &TtlCache<T>| {
            cache.purge_expired();
        })
    }
}

impl<T> Default for TtlCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TtlCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.config)
            .field("len", &self.entries.len())
            .finish()
    }
}
