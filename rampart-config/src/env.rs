// Environment variable overlay

use crate::{ConfigError, ConfigResult};
use serde_json::{Map, Number, Value};
use tracing::trace;

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "RAMPART";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Integer,
    Float,
    Text,
}

const FIELDS: &[(&str, &str, FieldKind)] = &[
    ("breaker", "failure_threshold", FieldKind::Integer),
    ("breaker", "success_threshold", FieldKind::Integer),
    ("breaker", "reset_timeout_ms", FieldKind::Integer),
    ("breaker", "half_open_max_calls", FieldKind::Integer),
    ("rate_limit", "window_ms", FieldKind::Integer),
    ("rate_limit", "max", FieldKind::Integer),
    ("rate_limit", "key_prefix", FieldKind::Text),
    ("rate_limit", "preset", FieldKind::Text),
    ("retry", "max_retries", FieldKind::Integer),
    ("retry", "initial_delay_ms", FieldKind::Integer),
    ("retry", "max_delay_ms", FieldKind::Integer),
    ("retry", "backoff_multiplier", FieldKind::Float),
    ("cache", "sweep_interval_ms", FieldKind::Integer),
    ("cache", "key_prefix", FieldKind::Text),
];

/// Overlays `PREFIX_SECTION_FIELD` variables onto a settings document.
///
/// `RAMPART_BREAKER_FAILURE_THRESHOLD=3` sets `breaker.failure_threshold`.
/// Variables that do not name a known field are ignored, so unrelated
/// `RAMPART_*` variables such as the logging ones pass through untouched.
#[derive(Debug, Clone)]
pub struct EnvOverlay {
    prefix: String,
}

impl EnvOverlay {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into().to_uppercase();
        if !prefix.is_empty() && !prefix.ends_with('_') {
            prefix.push('_');
        }
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Overlay the current process environment.
    pub fn apply(&self, doc: &mut Value) -> ConfigResult<usize> {
        self.apply_vars(doc, std::env::vars())
    }

    /// Overlay an explicit set of variables. Returns the number applied.
    pub fn apply_vars<I, K, V>(&self, doc: &mut Value, vars: I) -> ConfigResult<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let root = doc
            .as_object_mut()
            .ok_or_else(|| ConfigError::ParseError("settings document must be a table".to_string()))?;

        let mut applied = 0;
        for (key, raw) in vars {
            let key = key.as_ref();
            let Some((section, field, kind)) = self.lookup(key) else {
                continue;
            };

            let value = coerce(key, raw.as_ref(), kind)?;
            let table = root
                .entry(section)
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .ok_or_else(|| ConfigError::ParseError(format!("section '{}' must be a table", section)))?;
            table.insert(field.to_string(), value);

            trace!(var = key, section, field, "Applied environment override");
            applied += 1;
        }

        Ok(applied)
    }

    fn lookup(&self, key: &str) -> Option<(&'static str, &'static str, FieldKind)> {
        let rest = key.strip_prefix(&self.prefix)?.to_lowercase();
        FIELDS
            .iter()
            .find(|(section, field, _)| {
                rest.strip_prefix(*section)
                    .and_then(|r| r.strip_prefix('_'))
                    .is_some_and(|r| r == *field)
            })
            .copied()
    }
}

impl Default for EnvOverlay {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

fn coerce(key: &str, raw: &str, kind: FieldKind) -> ConfigResult<Value> {
    let raw = raw.trim();
    let invalid = || ConfigError::ParseError(format!("{} has invalid value '{}'", key, raw));

    match kind {
        FieldKind::Integer => raw.parse::<u64>().map(|n| Value::Number(n.into())).map_err(|_| invalid()),
        FieldKind::Float => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        FieldKind::Text => Ok(Value::String(raw.to_string())),
    }
}
