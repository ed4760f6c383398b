//! Cache configuration.

use crate::error::{CacheError, CacheResult};
use std::time::Duration;

/// TTL cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Prefix prepended to every key (`prefix:key`)
    pub key_prefix: Option<String>,
    /// Interval used by [`TtlCache::spawn_sweeper`](crate::TtlCache::spawn_sweeper)
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Set key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Set sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Check the configuration invariants
    pub fn validate(&self) -> CacheResult<()> {
        if self.sweep_interval.is_zero() {
            return Err(CacheError::Config("sweep_interval must be non-zero".to_string()));
        }
        if self.key_prefix.as_deref() == Some("") {
            return Err(CacheError::Config("key_prefix must not be empty when set".to_string()));
        }
        Ok(())
    }

    /// Build a full key with prefix
    pub fn build_key(&self, key: &str) -> String {
        if let Some(prefix) = &self.key_prefix {
            format!("{}:{}", prefix, key)
        } else {
            key.to_string()
        }
    }

    /// Strip the prefix from a stored key
    pub(crate) fn caller_key<'a>(&self, stored: &'a str) -> &'a str {
        self.key_prefix
            .as_deref()
            .and_then(|prefix| stored.strip_prefix(prefix))
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key_with_prefix() {
        let config = CacheConfig::default().with_key_prefix("myapp");
        assert_eq!(config.build_key("user:123"), "myapp:user:123");
        assert_eq!(config.caller_key("myapp:user:123"), "user:123");
    }

    #[test]
    fn test_build_key_without_prefix() {
        let config = CacheConfig::default();
        assert_eq!(config.build_key("user:123"), "user:123");
        assert_eq!(config.caller_key("user:123"), "user:123");
    }

    #[test]
    fn test_validation() {
        assert!(CacheConfig::default().validate().is_ok());
        assert!(CacheConfig::default().with_sweep_interval(Duration::ZERO).validate().is_err());
        assert!(CacheConfig::default().with_key_prefix("").validate().is_err());
    }
}
