//! Error types shared by the resilience primitives.

use std::time::Duration;
use thiserror::Error;

/// Why a breaker refused to run an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenReason {
    /// The breaker is open and its cooldown has not elapsed.
    Open,
    /// The breaker is half-open and all probe slots are taken.
    HalfOpenLimit,
}

impl std::fmt::Display for OpenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::HalfOpenLimit => write!(f, "half-open probe limit reached"),
        }
    }
}

/// The breaker failed fast without invoking the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Circuit breaker '{name}' is {reason}; retry after {retry_after:?}")]
pub struct CircuitOpenError {
    /// Name of the breaker that rejected the call.
    pub name: String,
    /// Which condition caused the rejection.
    pub reason: OpenReason,
    /// Remaining cooldown before a probe will be admitted.
    pub retry_after: Duration,
}

impl CircuitOpenError {
    /// Create a new open-circuit error.
    pub fn new(name: impl Into<String>, reason: OpenReason, retry_after: Duration) -> Self {
        Self {
            name: name.into(),
            reason,
            retry_after,
        }
    }

    /// Remaining cooldown rounded up to whole seconds.
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(self.retry_after)
    }
}

/// Error returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call).
///
/// The operation's own error is carried untouched in `Operation`.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call; the operation was not invoked.
    #[error(transparent)]
    Open(CircuitOpenError),
    /// The operation ran and failed.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Whether the call was rejected without running the operation.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// The open-circuit error, if this was a rejection.
    pub fn open_error(&self) -> Option<&CircuitOpenError> {
        match self {
            Self::Open(e) => Some(e),
            Self::Operation(_) => None,
        }
    }

    /// The operation's error, if the operation ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Open(_) => None,
            Self::Operation(e) => Some(e),
        }
    }
}

/// Result type for breaker-protected calls.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Invalid component configuration, reported at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {component} configuration: {message}")]
pub struct ConfigError {
    /// Component whose configuration was rejected.
    pub component: &'static str,
    /// What was wrong with it.
    pub message: String,
}

impl ConfigError {
    /// Create a new configuration error.
    pub fn new(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            component,
            message: message.into(),
        }
    }
}

/// Round a duration up to whole seconds.
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs + 1 } else { secs }
}
