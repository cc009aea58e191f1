//! Per-plugin configuration store.
//!
//! Each plugin declares a [`ConfigSchema`] for its namespace. Values start
//! from the schema defaults and can be changed afterwards; every change is
//! pushed to the watchers registered for that namespace.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use conduit_core::ConfigSchema;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Handle for a registered change watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// One changed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    /// Plugin namespace.
    pub namespace: String,
    /// Field key.
    pub key: String,
    /// New value.
    pub value: Value,
}

/// Callback invoked after a value changes.
///
/// Runs on the task that made the change, after the store's locks are
/// released; it should hand off any slow work.
pub type ConfigWatcher = Arc<dyn Fn(&ConfigChange) + Send + Sync>;

/// Config store consumed by the host.
#[async_trait]
pub trait PluginConfigStore: Send + Sync {
    /// Install or replace the schema for `namespace` and return the current
    /// values. Existing values that still fit the schema are kept; missing
    /// ones are seeded from defaults.
    async fn set_schema(
        &self,
        namespace: &str,
        schema: ConfigSchema,
    ) -> ConfigResult<Map<String, Value>>;

    /// Every value in `namespace`. Empty when no schema was declared.
    async fn get_all(&self, namespace: &str) -> ConfigResult<Map<String, Value>>;

    /// Set one value and notify watchers if it changed.
    async fn set(&self, namespace: &str, key: &str, value: Value) -> ConfigResult<()>;

    /// Register a watcher for changes in `namespace`.
    fn on_change(&self, namespace: &str, watcher: ConfigWatcher) -> WatchId;

    /// Remove a watcher. Returns `true` if it existed.
    fn remove_watch(&self, id: WatchId) -> bool;
}

#[derive(Debug, Default)]
struct Namespace {
    schema: ConfigSchema,
    values: Map<String, Value>,
}

/// In-memory [`PluginConfigStore`].
#[derive(Default)]
pub struct MemoryConfigStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
    watchers: RwLock<HashMap<WatchId, (String, ConfigWatcher)>>,
    next_watch: AtomicU64,
}

impl fmt::Debug for MemoryConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let namespaces = self.namespaces.read().map(|n| n.len()).unwrap_or_default();
        let watchers = self.watchers.read().map(|w| w.len()).unwrap_or_default();
        f.debug_struct("MemoryConfigStore")
            .field("namespaces", &namespaces)
            .field("watchers", &watchers)
            .finish()
    }
}

impl MemoryConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, change: &ConfigChange) -> ConfigResult<()> {
        let watchers: Vec<ConfigWatcher> = self
            .watchers
            .read()
            .map_err(|e| ConfigError::Internal(e.to_string()))?
            .values()
            .filter(|(ns, _)| *ns == change.namespace)
            .map(|(_, w)| Arc::clone(w))
            .collect();

        debug!(
            namespace = %change.namespace,
            key = %change.key,
            watchers = watchers.len(),
            "config value changed"
        );
        for watcher in watchers {
            watcher(change);
        }
        Ok(())
    }
}

#[async_trait]
impl PluginConfigStore for MemoryConfigStore {
    async fn set_schema(
        &self,
        namespace: &str,
        schema: ConfigSchema,
    ) -> ConfigResult<Map<String, Value>> {
        schema.validate().map_err(|e| ConfigError::InvalidSchema {
            namespace: namespace.to_string(),
            message: e.to_string(),
        })?;

        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|e| ConfigError::Internal(e.to_string()))?;
        let entry = namespaces.entry(namespace.to_string()).or_default();

        let mut values = Map::new();
        for field in &schema.fields {
            let kept = entry
                .values
                .get(&field.key)
                .filter(|v| field.field_type.accepts(v))
                .cloned();
            if let Some(value) = kept.or_else(|| field.default.clone()) {
                values.insert(field.key.clone(), value);
            }
        }

        entry.schema = schema;
        entry.values = values.clone();
        debug!(namespace, fields = entry.schema.fields.len(), "config schema installed");
        Ok(values)
    }

    async fn get_all(&self, namespace: &str) -> ConfigResult<Map<String, Value>> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|e| ConfigError::Internal(e.to_string()))?;
        Ok(namespaces
            .get(namespace)
            .map(|n| n.values.clone())
            .unwrap_or_default())
    }

    async fn set(&self, namespace: &str, key: &str, value: Value) -> ConfigResult<()> {
        let changed = {
            let mut namespaces = self
                .namespaces
                .write()
                .map_err(|e| ConfigError::Internal(e.to_string()))?;
            let entry = namespaces
                .get_mut(namespace)
                .ok_or_else(|| ConfigError::UnknownNamespace(namespace.to_string()))?;
            let field = entry
                .schema
                .field(key)
                .ok_or_else(|| ConfigError::UnknownKey {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                })?;
            if !field.field_type.accepts(&value) {
                return Err(ConfigError::TypeMismatch {
                    key: key.to_string(),
                    expected: field.field_type.as_str(),
                });
            }
            if entry.values.get(key) == Some(&value) {
                false
            } else {
                entry.values.insert(key.to_string(), value.clone());
                true
            }
        };

        if changed {
            self.notify(&ConfigChange {
                namespace: namespace.to_string(),
                key: key.to_string(),
                value,
            })?;
        }
        Ok(())
    }

    fn on_change(&self, namespace: &str, watcher: ConfigWatcher) -> WatchId {
        let id = WatchId(self.next_watch.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut watchers) = self.watchers.write() {
            watchers.insert(id, (namespace.to_string(), watcher));
        }
        id
    }

    fn remove_watch(&self, id: WatchId) -> bool {
        self.watchers
            .write()
            .map(|mut w| w.remove(&id).is_some())
            .unwrap_or(false)
    }
}
