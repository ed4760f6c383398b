//! Retryable error classification.
//!
//! [`Retry::run`](crate::Retry::run) retries every error. Callers that only
//! want to retry transient failures pass a classifier to
//! [`Retry::run_if`](crate::Retry::run_if), usually built from
//! [`RetryableErrors`].

use std::error::Error;
use std::io::ErrorKind;
use std::sync::Arc;

/// Type alias for a retry error predicate function.
pub type RetryErrorPredicate = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "econnreset",
    "econnrefused",
    "connection reset",
    "connection refused",
    "connection closed",
    "429",
    "too many requests",
    "502",
    "bad gateway",
    "503",
    "service unavailable",
];

/// Default heuristic: network failures, timeouts and HTTP 429/502/503 are
/// retryable, everything else is not.
///
/// The whole `source()` chain is inspected, so wrapped transport errors are
/// recognised too.
pub fn is_retryable_error(error: &(dyn Error + 'static)) -> bool {
    let mut current: Option<&(dyn Error + 'static)> = Some(error);
    while let Some(err) = current {
        if is_transient(err) {
            return true;
        }
        current = err.source();
    }
    false
}

fn is_transient(err: &(dyn Error + 'static)) -> bool {
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        if matches!(
            io.kind(),
            ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::TimedOut
                | ErrorKind::Interrupted
                | ErrorKind::UnexpectedEof
        ) {
            return true;
        }
    }

    if err.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
        return true;
    }

    let message = err.to_string().to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Configuration for which errors are retryable.
#[derive(Clone, Default)]
pub enum RetryableErrors {
    /// Retry all errors.
    All,
    /// Never retry (fail immediately).
    None,
    /// Retry what [`is_retryable_error`] accepts.
    #[default]
    Transient,
    /// Use custom predicate.
    Custom(RetryErrorPredicate),
}

impl RetryableErrors {
    /// Build a custom classifier.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Whether `error` should be retried under this policy.
    pub fn matches(&self, error: &(dyn Error + 'static)) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Transient => is_retryable_error(error),
            Self::Custom(predicate) => predicate(error),
        }
    }
}

impl std::fmt::Debug for RetryableErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::None => write!(f, "None"),
            Self::Transient => write!(f, "Transient"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}
