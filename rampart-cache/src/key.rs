//! Hierarchical cache keys.
//!
//! Keys take the form `service:entity:paramsHash` so that
//! [`TtlCache::invalidate`](crate::TtlCache::invalidate) can drop everything
//! for a service (`"contacts:"`) or one entity (`"contacts:list:"`) at once.
//!
//! ```rust
//! use rampart_cache::CacheKey;
//! use serde_json::json;
//!
//! let key = CacheKey::new("contacts")
//!     .entity("list")
//!     .params(&json!({ "workspace": 42, "page": 1 }))
//!     .unwrap();
//!
//! assert!(key.to_string().starts_with("contacts:list:"));
//! ```

use crate::error::CacheResult;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex digits kept from the parameter digest.
const PARAMS_HASH_LEN: usize = 16;

/// Builder for `service:entity:paramsHash` keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    service: String,
    entity: Option<String>,
    params_hash: Option<String>,
}

impl CacheKey {
    /// Start a key for `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entity: None,
            params_hash: None,
        }
    }

    /// Set the entity segment.
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Hash `params` into the last segment.
    pub fn params<P: Serialize + ?Sized>(mut self, params: &P) -> CacheResult<Self> {
        self.params_hash = Some(hash_params(params)?);
        Ok(self)
    }

    /// Pattern matching every key of a service.
    pub fn service_pattern(service: &str) -> String {
        format!("{service}:")
    }

    /// Pattern matching every key of one entity within a service.
    pub fn entity_pattern(service: &str, entity: &str) -> String {
        format!("{service}:{entity}:")
    }

    /// Render the key.
    pub fn build(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.service)?;
        if let Some(entity) = &self.entity {
            write!(f, ":{entity}")?;
        }
        if let Some(hash) = &self.params_hash {
            write!(f, ":{hash}")?;
        }
        Ok(())
    }
}

/// First 16 hex digits of the SHA-256 of `params` encoded as JSON.
pub fn hash_params<P: Serialize + ?Sized>(params: &P) -> CacheResult<String> {
    let encoded = serde_json::to_vec(params)?;
    let digest = Sha256::digest(&encoded);
    let mut hash = hex::encode(digest);
    hash.truncate(PARAMS_HASH_LEN);
    Ok(hash)
}
