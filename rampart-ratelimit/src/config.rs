//! Rate limiter configuration and builder

use crate::RateLimiter;
use crate::error::{RateLimitError, RateLimitResult};
use crate::extractor::KeyExtractor;
use crate::stores::{MemoryStore, RateLimitStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Window length and request ceiling for one fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Window length
    pub window: Duration,
    /// Requests allowed per window
    pub max_requests: u64,
}

impl WindowConfig {
    /// Create a window configuration
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self { window, max_requests }
    }

    /// Check the configuration invariants
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.max_requests == 0 {
            return Err(RateLimitError::config("max_requests must be at least 1"));
        }
        if self.window.is_zero() {
            return Err(RateLimitError::config("window must be non-zero"));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 60,
        }
    }
}

/// Configuration for the rate limiter
#[derive(Debug, Clone, Default)]
pub struct RateLimitConfig {
    /// Default window used when a call has no override
    pub window: WindowConfig,
    /// Prefix prepended to every stored key (`prefix:key`)
    pub key_prefix: Option<String>,
    /// How request keys are derived for [`RateLimiter::admit_request`]
    pub extractor: KeyExtractor,
}

impl RateLimitConfig {
    /// Create a new configuration builder
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::new()
    }

    /// Check the configuration invariants
    pub fn validate(&self) -> RateLimitResult<()> {
        self.window.validate()?;
        if self.key_prefix.as_deref() == Some("") {
            return Err(RateLimitError::config("key_prefix must not be empty when set"));
        }
        Ok(())
    }

    /// Storage key for a caller key
    pub fn storage_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}:{key}"),
            None => key.to_string(),
        }
    }
}

/// Builder for creating a RateLimiter
pub struct RateLimiterBuilder {
    config: RateLimitConfig,
    store: Option<Arc<dyn RateLimitStore>>,
}

impl RateLimiterBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: RateLimitConfig::default(),
            store: None,
        }
    }

    /// Use a fixed window of `max_requests` per `window`
    pub fn fixed_window(mut self, max_requests: u64, window: Duration) -> Self {
        self.config.window = WindowConfig::new(max_requests, window);
        self
    }

    /// Set the key prefix for storage
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = Some(prefix.into());
        self
    }

    /// Set the key extraction strategy
    pub fn extractor(mut self, extractor: KeyExtractor) -> Self {
        self.config.extractor = extractor;
        self
    }

    /// Use a custom store instead of a fresh in-memory one
    pub fn store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the rate limiter
    pub fn build(self) -> RateLimitResult<RateLimiter> {
        self.config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn RateLimitStore>);
        debug!(
            window = ?self.config.window.window,
            max_requests = self.config.window.max_requests,
            store = store.store_type(),
            "Building rate limiter"
        );

        Ok(RateLimiter::with_store(store, self.config))
    }
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.window.window, Duration::from_secs(60));
        assert_eq!(config.window.max_requests, 60);
        assert!(config.key_prefix.is_none());
        assert!(matches!(config.extractor, KeyExtractor::ForwardedIp));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_key() {
        let mut config = RateLimitConfig::default();
        assert_eq!(config.storage_key("ip1"), "ip1");

        config.key_prefix = Some("strict".to_string());
        assert_eq!(config.storage_key("ip1"), "strict:ip1");
    }

    #[test]
    fn test_validation() {
        assert!(WindowConfig::new(0, Duration::from_secs(1)).validate().is_err());
        assert!(WindowConfig::new(1, Duration::ZERO).validate().is_err());

        let config = RateLimitConfig {
            key_prefix: Some(String::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_fixed_window() {
        let limiter = RateLimiterBuilder::new()
            .fixed_window(50, Duration::from_secs(30))
            .key_prefix("test")
            .build()
            .unwrap();

        assert_eq!(limiter.config().window, WindowConfig::new(50, Duration::from_secs(30)));
        assert_eq!(limiter.config().key_prefix.as_deref(), Some("test"));
    }

    #[test]
    fn test_builder_rejects_invalid_window() {
        let result = RateLimiterBuilder::new().fixed_window(0, Duration::from_secs(60)).build();
        assert!(matches!(result, Err(RateLimitError::Config(_))));
    }
}
