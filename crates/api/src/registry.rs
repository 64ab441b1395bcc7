//! The process-wide plugin registry.
//!
//! Populated once during startup, then shared read-only behind an `Arc`.
//! Listeners and HTTP surfaces name plugins by id and dispatch through this
//! registry, which keeps the listener → plugin relation acyclic.

use crate::plugin::ErasedPlugin;
use attestor_types::error::OracleError;
use std::collections::HashMap;
use std::sync::Arc;

/// Name → plugin handler lookup.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn ErasedPlugin>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin under its own id.
    ///
    /// Only called during startup; duplicate ids are a wiring bug.
    pub fn register(&mut self, plugin: Arc<dyn ErasedPlugin>) -> Result<(), OracleError> {
        let id = plugin.id().to_string();
        if self.plugins.contains_key(&id) {
            return Err(OracleError::Config(format!(
                "plugin id registered twice: {id}"
            )));
        }
        self.plugins.insert(id, plugin);
        Ok(())
    }

    /// Returns the handler for a plugin id.
    pub fn get(&self, id: &str) -> Result<Arc<dyn ErasedPlugin>, OracleError> {
        self.plugins
            .get(id)
            .cloned()
            .ok_or_else(|| OracleError::NotFound(format!("plugin: {id}")))
    }

    /// The registered plugin ids, for diagnostics.
    pub fn ids(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PeerPrepared, Plugin};
    use async_trait::async_trait;
    use attestor_types::value::Value;

    struct Noop(&'static str);

    #[async_trait]
    impl Plugin for Noop {
        type Input = Value;
        type Prepared = Value;
        type Aggregated = Value;
        type Output = Value;

        fn id(&self) -> &str {
            self.0
        }
        async fn prepare(&self, input: &Value) -> Result<Value, OracleError> {
            Ok(input.clone())
        }
        async fn process(&self, _: &[PeerPrepared<Value>]) -> Result<Value, OracleError> {
            Ok(Value::Null)
        }
        async fn validate(&self, aggregated: Value, _: &Value) -> Result<Value, OracleError> {
            Ok(aggregated)
        }
        async fn execute(&self, _: Value) -> Result<Value, OracleError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn lookup_hits_and_misses() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Noop("evm_forwarder"))).unwrap();
        assert!(registry.get("evm_forwarder").is_ok());
        let err = registry.get("missing").err().unwrap();
        assert!(matches!(err, OracleError::NotFound(_)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Noop("p"))).unwrap();
        assert!(registry.register(Arc::new(Noop("p"))).is_err());
    }
}
