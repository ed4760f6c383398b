//! Settings document for every resilience component.
//!
//! All durations are expressed in milliseconds. Every field is optional and
//! falls back to the component default.
//!
//! ```toml
//! [breaker]
//! failure_threshold = 3
//! reset_timeout_ms = 1000
//!
//! [rate_limit]
//! preset = "strict"
//!
//! [retry]
//! max_retries = 4
//! ```

use crate::{ConfigError, ConfigResult};
use rampart_cache::CacheConfig;
use rampart_core::{CircuitBreakerConfig, RetryConfig};
use rampart_ratelimit::{Preset, RateLimitConfig, WindowConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trait for validatable settings sections
pub trait Validate {
    fn validate(&self) -> ConfigResult<()>;
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `[breaker]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_max_calls: Option<u32>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            success_threshold: defaults.success_threshold,
            reset_timeout_ms: millis(defaults.reset_timeout),
            half_open_max_calls: defaults.half_open_max_calls,
        }
    }
}

impl BreakerSettings {
    /// Breaker configuration for dependency `name`.
    pub fn to_config(&self, name: impl Into<String>) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            name: name.into(),
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
            half_open_max_calls: self.half_open_max_calls,
        }
    }
}

impl Validate for BreakerSettings {
    fn validate(&self) -> ConfigResult<()> {
        Ok(self.to_config("settings").validate()?)
    }
}

/// `[rate_limit]` section
///
/// Explicit `window_ms`/`max` values win over the named `preset`, which in
/// turn wins over the limiter defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSettings {
    pub preset: Option<String>,
    pub window_ms: Option<u64>,
    pub max: Option<u64>,
    pub key_prefix: Option<String>,
}

impl RateLimitSettings {
    pub fn to_config(&self) -> ConfigResult<RateLimitConfig> {
        let mut config = match &self.preset {
            Some(name) => name.parse::<Preset>()?.config(),
            None => RateLimitConfig::default(),
        };

        let base = config.window;
        config.window = WindowConfig::new(
            self.max.unwrap_or(base.max_requests),
            self.window_ms.map(Duration::from_millis).unwrap_or(base.window),
        );
        if let Some(prefix) = &self.key_prefix {
            config.key_prefix = Some(prefix.clone());
        }

        Ok(config)
    }
}

impl Validate for RateLimitSettings {
    fn validate(&self) -> ConfigResult<()> {
        Ok(self.to_config()?.validate()?)
    }
}

/// `[retry]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            initial_delay_ms: millis(defaults.initial_delay),
            max_delay_ms: millis(defaults.max_delay),
            backoff_multiplier: defaults.backoff_multiplier,
        }
    }
}

impl RetrySettings {
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .backoff_multiplier(self.backoff_multiplier)
    }
}

impl Validate for RetrySettings {
    fn validate(&self) -> ConfigResult<()> {
        Ok(self.to_config().validate()?)
    }
}

/// `[cache]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub sweep_interval_ms: u64,
    pub key_prefix: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            sweep_interval_ms: millis(defaults.sweep_interval),
            key_prefix: defaults.key_prefix,
        }
    }
}

impl CacheSettings {
    pub fn to_config(&self) -> CacheConfig {
        CacheConfig {
            key_prefix: self.key_prefix.clone(),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }
}

impl Validate for CacheSettings {
    fn validate(&self) -> ConfigResult<()> {
        Ok(self.to_config().validate()?)
    }
}

/// Settings for all four components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceSettings {
    pub breaker: BreakerSettings,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
    pub cache: CacheSettings,
}

impl ResilienceSettings {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let doc = crate::ConfigLoader::new(crate::FileFormat::Toml).parse(content)?;
        Self::from_value(doc)
    }

    /// Parse a JSON document.
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let doc = crate::ConfigLoader::new(crate::FileFormat::Json).parse(content)?;
        Self::from_value(doc)
    }

    /// Deserialize from an already-parsed document.
    pub fn from_value(doc: serde_json::Value) -> ConfigResult<Self> {
        serde_json::from_value(doc).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn breaker_config(&self, name: impl Into<String>) -> CircuitBreakerConfig {
        self.breaker.to_config(name)
    }

    pub fn rate_limit_config(&self) -> ConfigResult<RateLimitConfig> {
        self.rate_limit.to_config()
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry.to_config()
    }

    pub fn cache_config(&self) -> CacheConfig {
        self.cache.to_config()
    }
}

impl Validate for ResilienceSettings {
    fn validate(&self) -> ConfigResult<()> {
        self.breaker.validate()?;
        self.rate_limit.validate()?;
        self.retry.validate()?;
        self.cache.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_components() {
        let settings = ResilienceSettings::default();
        assert!(settings.validate().is_ok());

        let breaker = settings.breaker_config("db");
        assert_eq!(breaker.name, "db");
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.success_threshold, 2);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(60));
        assert_eq!(breaker.half_open_max_calls, None);

        let retry = settings.retry_config();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(1000));
        assert_eq!(retry.max_delay, Duration::from_millis(10_000));

        let limit = settings.rate_limit_config().unwrap();
        assert_eq!(limit.window, WindowConfig::new(60, Duration::from_secs(60)));

        assert_eq!(settings.cache_config(), CacheConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let settings = ResilienceSettings::from_toml_str(
            r#"
            [breaker]
            failure_threshold = 3
            reset_timeout_ms = 1000

            [rate_limit]
            window_ms = 60000
            max = 2
            "#,
        )
        .unwrap();

        assert_eq!(settings.breaker.failure_threshold, 3);
        assert_eq!(settings.breaker.success_threshold, 2);
        assert_eq!(settings.breaker_config("x").reset_timeout, Duration::from_secs(1));
        assert_eq!(
            settings.rate_limit_config().unwrap().window,
            WindowConfig::new(2, Duration::from_secs(60))
        );
        assert_eq!(settings.retry, RetrySettings::default());
    }

    #[test]
    fn test_preset_with_override() {
        let settings = ResilienceSettings::from_json_str(r#"{"rate_limit": {"preset": "strict", "max": 20}}"#).unwrap();
        let config = settings.rate_limit_config().unwrap();
        assert_eq!(config.window, WindowConfig::new(20, Duration::from_secs(900)));
        assert_eq!(config.key_prefix.as_deref(), Some("strict"));
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let settings = ResilienceSettings::from_json_str(r#"{"rate_limit": {"preset": "relaxed"}}"#).unwrap();
        assert!(matches!(settings.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ResilienceSettings::from_toml_str("[breaker]\nfailure_treshold = 3\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation_failures() {
        let mut settings = ResilienceSettings::default();
        settings.breaker.failure_threshold = 0;
        assert!(settings.validate().is_err());

        let mut settings = ResilienceSettings::default();
        settings.retry.backoff_multiplier = 0.5;
        assert!(settings.validate().is_err());

        let mut settings = ResilienceSettings::default();
        settings.retry.max_delay_ms = 10;
        assert!(settings.validate().is_err());

        let mut settings = ResilienceSettings::default();
        settings.rate_limit.max = Some(0);
        assert!(settings.validate().is_err());

        let mut settings = ResilienceSettings::default();
        settings.cache.sweep_interval_ms = 0;
        assert!(settings.validate().is_err());
    }
}
