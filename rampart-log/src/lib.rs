//! Rampart Logging
//!
//! Installs the process-wide `tracing` subscriber used by the Rampart
//! components. The components themselves only emit events through the
//! `tracing` macros; this crate decides where those events go.
//!
//! # Usage
//!
//! ```rust,no_run
//! // Reads RAMPART_* variables and installs the subscriber once.
//! rampart_log::init();
//!
//! tracing::info!(breaker = "payments", "Circuit breaker initialized");
//! ```
//!
//! # Environment Variables
//!
//! - `RAMPART_DEBUG=1` - Enable debug logging
//! - `RAMPART_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `RAMPART_LOG_FORMAT=pretty|compact|json` - Set output format
//! - `RAMPART_LOG_COLOR=1|0` - Enable/disable ANSI colors
//! - `RUST_LOG` - When set, takes precedence over `RAMPART_LOG_LEVEL`

use once_cell::sync::Lazy;
use std::env;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

// ============================================================================
// Log Levels
// ============================================================================

/// Log level for Rampart logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level (least verbose)
    Error = 4,
    /// Off (no logging)
    Off = 5,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_directive().to_uppercase())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether ANSI colors are enabled
    pub color: bool,
    /// Whether to include the event target (module path)
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            target: true,
        }
    }
}

impl LogConfig {
    /// Create config from `RAMPART_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        let debug = flag("RAMPART_DEBUG").unwrap_or(false);

        let level = lookup("RAMPART_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("RAMPART_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = flag("RAMPART_LOG_COLOR")
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let target = flag("RAMPART_LOG_TARGET").unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color: color && format != Format::Json,
            target,
        }
    }

    /// Build the filter for this configuration. `RUST_LOG` wins when set.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()))
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LogError {
    /// A global subscriber was already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    AlreadyInitialized(String),
}

// ============================================================================
// Public API
// ============================================================================

/// Get the global configuration (read from the environment once).
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Install the global subscriber using the environment configuration.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init() {
    let _ = try_init();
}

/// Install the global subscriber, reporting if one already exists.
pub fn try_init() -> Result<(), LogError> {
    try_init_with(config())
}

/// Install the global subscriber for an explicit configuration.
pub fn try_init_with(config: &LogConfig) -> Result<(), LogError> {
    let registry = tracing_subscriber::registry().with(config.filter());
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(config.color)
        .with_target(config.target);

    let result = match config.format {
        Format::Pretty => registry.with(layer.pretty()).try_init(),
        Format::Compact => registry.with(layer.compact()).try_init(),
        #[cfg(feature = "json")]
        Format::Json => registry.with(layer.json()).try_init(),
        #[cfg(not(feature = "json"))]
        Format::Json => registry.with(layer.compact()).try_init(),
    };

    result.map_err(|e| LogError::AlreadyInitialized(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
