// Error types for configuration loading

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<rampart_core::ConfigError> for ConfigError {
    fn from(err: rampart_core::ConfigError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}

impl From<rampart_ratelimit::RateLimitError> for ConfigError {
    fn from(err: rampart_ratelimit::RateLimitError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}

impl From<rampart_cache::CacheError> for ConfigError {
    fn from(err: rampart_cache::CacheError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
