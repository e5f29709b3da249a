//! Plugin Registry: the data structure a dynamic-plugin loader would
//! populate, kept in scope even though loading plugins from disk is not
//! (spec §1's Non-goals exclude the loader itself, not its registry).
//!
//! Grounded on `scheduler.rs`'s "insert fails on duplicate key" discipline,
//! same as [[registry]] but for plugin ids instead of job ids.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type PluginHandle = Arc<dyn Any + Send + Sync>;

/// Implemented by whatever actually loads a plugin's code (a dynamic
/// library, a WASM module, ...). No implementation ships here: that's
/// outside this agent's scope.
pub trait PluginLoader: Send + Sync {
    fn load(&self, plugin_id: &str) -> anyhow::Result<PluginHandle>;
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Mutex<HashMap<String, PluginHandle>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry::default()
    }

    /// Fails rather than overwriting if `plugin_id` is already registered.
    pub fn insert(&self, plugin_id: String, handle: PluginHandle) -> Result<(), String> {
        let mut plugins = self.plugins.lock().unwrap();
        if plugins.contains_key(&plugin_id) {
            return Err(format!("plugin {plugin_id} is already registered"));
        }
        plugins.insert(plugin_id, handle);
        Ok(())
    }

    pub fn get(&self, plugin_id: &str) -> Option<PluginHandle> {
        self.plugins.lock().unwrap().get(plugin_id).cloned()
    }

    pub fn remove(&self, plugin_id: &str) -> Option<PluginHandle> {
        self.plugins.lock().unwrap().remove(plugin_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_insert_is_rejected() {
        let registry = PluginRegistry::new();
        registry.insert("a".into(), Arc::new(42i32)).unwrap();
        let err = registry.insert("a".into(), Arc::new(7i32)).unwrap_err();
        assert!(err.contains('a'));
        let handle = registry.get("a").unwrap();
        assert_eq!(*handle.downcast::<i32>().unwrap(), 42);
    }
}
