//! Named circuit breakers, one per downstream dependency.

use super::circuit_breaker::{BreakerStats, CircuitBreaker, CircuitBreakerConfig, TransitionListener};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Owns one [`CircuitBreaker`] per dependency name.
///
/// Breakers created through the registry share a template configuration
/// (with the name substituted) and the registry's listeners. The registry is
/// an ordinary value: create one at startup and pass it where needed.
pub struct BreakerRegistry {
    template: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    listeners: RwLock<Vec<Arc<dyn TransitionListener>>>,
}

impl BreakerRegistry {
    /// Create a registry whose breakers use `template` settings.
    pub fn new(template: CircuitBreakerConfig) -> Self {
        Self {
            template,
            breakers: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Attach a listener to every breaker, existing and future.
    pub fn add_listener(&self, listener: Arc<dyn TransitionListener>) {
        // Held across the walk so a breaker is either seen here or created
        // after the push. Lock order is listeners, then map shards.
        let mut listeners = self.listeners.write();
        for entry in self.breakers.iter() {
            entry.value().add_listener(listener.clone());
        }
        listeners.push(listener);
    }

    /// Get the breaker for `name`, creating it from the template if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        let config = CircuitBreakerConfig {
            name: name.to_string(),
            ..self.template.clone()
        };
        self.get_or_create_with(config)
    }

    /// Get the breaker for `config.name`, creating it with `config` if needed.
    ///
    /// An existing breaker keeps its original configuration.
    pub fn get_or_create_with(&self, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let listeners = self.listeners.read();
        self.breakers
            .entry(config.name.clone())
            .or_insert_with(|| {
                let breaker = CircuitBreaker::new(config);
                for listener in listeners.iter() {
                    breaker.add_listener(listener.clone());
                }
                breaker
            })
            .clone()
    }

    /// Get an existing breaker.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    /// Names of all registered breakers.
    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Stats for every breaker, sorted by name.
    pub fn stats(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<BreakerStats> = self.breakers.iter().map(|entry| entry.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Reset every breaker.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breaker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("template", &self.template)
            .field("breakers", &self.names())
            .finish()
    }
}
