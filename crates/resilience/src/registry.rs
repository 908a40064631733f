//! Registry associating guarded-resource names with breaker instances.
//!
//! The process composition root owns one registry and hands breaker handles
//! to every collaborator that needs them, instead of collaborators reaching
//! into module-level singletons. Handles are cheap clones sharing the same
//! underlying state.

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::breaker::CircuitBreaker;
use crate::config::{CircuitBreakerConfig, ConfigResult};

/// Maps guarded-resource names to shared [`CircuitBreaker`] instances.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, CircuitBreaker>,
}

impl BreakerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { breakers: DashMap::new() }
    }

    /// Look up the breaker guarding `name`, if registered.
    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Return the breaker guarding `name`, creating it with `config` on
    /// first use.
    ///
    /// The config is only consulted when the breaker does not exist yet;
    /// an already-registered breaker keeps its original configuration.
    pub fn get_or_create(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> ConfigResult<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }

        let breaker = CircuitBreaker::new(name, config)?;
        debug!(name, "registered circuit breaker");
        // A racing creator may have inserted first; keep whichever entry won.
        Ok(self
            .breakers
            .entry(name.to_string())
            .or_insert(breaker)
            .value()
            .clone())
    }

    /// Remove the breaker guarding `name`, returning it if present.
    pub fn remove(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.remove(name).map(|(_, breaker)| breaker)
    }

    /// Names of all registered breakers.
    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Force every registered breaker closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Status maps for every registered breaker, keyed by name.
    ///
    /// Suitable as the body of an HTTP status endpoint.
    pub fn status_all(&self) -> Value {
        let mut statuses = Map::new();
        for entry in self.breakers.iter() {
            statuses.insert(entry.key().clone(), entry.value().status());
        }
        Value::Object(statuses)
    }
}
