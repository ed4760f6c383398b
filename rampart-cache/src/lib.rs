//! # Rampart Cache
//!
//! In-process result cache with per-entry TTL and hit/miss statistics.
//!
//! ## Features
//!
//! - **Per-entry TTL**: every `set` chooses its own freshness window
//! - **Lazy Eviction**: stale entries disappear on lookup, on
//!   `purge_expired`, or via a background sweeper
//! - **Compute on Miss**: `get_or_compute` wraps an expensive operation
//! - **Bulk Invalidation**: remove every key containing a pattern
//! - **Hierarchical Keys**: `CacheKey` builds `service:entity:paramsHash`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rampart_cache::{CacheKey, TtlCache};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache: TtlCache<Vec<String>> = TtlCache::new();
//! let key = CacheKey::new("contacts").entity("list").params(&json!({"page": 1}))?;
//!
//! let names = cache
//!     .get_or_compute(&key.build(), Duration::from_secs(300), || async {
//!         Ok::<_, std::io::Error>(vec!["alice".to_string()])
//!     })
//!     .await?;
//!
//! // Drop everything cached for the contacts service.
//! cache.invalidate(&CacheKey::service_pattern("contacts"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod key;
pub mod ttl;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use key::{CacheKey, hash_params};
pub use rampart_core::SweeperHandle;
pub use ttl::{CacheStats, TtlCache};
