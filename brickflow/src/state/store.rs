//! The namespaced mod variable store.

use super::merge::{merge_state, MergeStrategy};
use crate::context::RunIdentity;
use crate::errors::BrickflowError;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A state namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum StateNamespace {
    /// State shared by every mod on the page.
    Shared,
    /// State owned by one mod.
    #[serde(rename_all = "camelCase")]
    Mod {
        /// The owning mod.
        mod_id: String,
    },
    /// State private to one mod component.
    #[serde(rename_all = "camelCase")]
    Component {
        /// The owning component.
        component_id: String,
        /// The mod the component belongs to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mod_id: Option<String>,
    },
}

impl StateNamespace {
    /// Returns the mod namespace of a run.
    #[must_use]
    pub fn for_mod(identity: &RunIdentity) -> Self {
        Self::Mod {
            mod_id: identity.mod_id.clone().unwrap_or_else(|| identity.owner()),
        }
    }

    /// Returns the component-private namespace of a run.
    #[must_use]
    pub fn for_component(identity: &RunIdentity) -> Self {
        Self::Component {
            component_id: identity.owner(),
            mod_id: identity.mod_id.clone(),
        }
    }

    /// Returns true if this namespace belongs to `mod_id`.
    #[must_use]
    pub fn belongs_to_mod(&self, mod_id: &str) -> bool {
        match self {
            Self::Shared => false,
            Self::Mod { mod_id: owner } => owner == mod_id,
            Self::Component { mod_id: owner, .. } => owner.as_deref() == Some(mod_id),
        }
    }
}

impl fmt::Display for StateNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Mod { mod_id } => write!(f, "mod:{mod_id}"),
            Self::Component {
                component_id,
                mod_id: Some(mod_id),
            } => write!(f, "component:{mod_id}/{component_id}"),
            Self::Component { component_id, .. } => write!(f, "component:{component_id}"),
        }
    }
}

/// A committed state write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    /// The namespace written.
    pub namespace: StateNamespace,
    /// The namespace state after the write.
    pub state: Value,
}

/// Persistence medium for namespace state.
pub trait StateBackend: Send + Sync + fmt::Debug {
    /// Loads a namespace's state.
    fn load(&self, namespace: &StateNamespace) -> Option<Map<String, Value>>;

    /// Stores a namespace's state.
    fn store(&self, namespace: &StateNamespace, state: Map<String, Value>);

    /// Removes a namespace.
    fn remove(&self, namespace: &StateNamespace);

    /// Lists the namespaces that hold state.
    fn namespaces(&self) -> Vec<StateNamespace>;
}

/// A backend keeping state in memory.
#[derive(Debug, Default)]
pub struct InMemoryStateBackend {
    entries: DashMap<StateNamespace, Map<String, Value>>,
}

impl InMemoryStateBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for InMemoryStateBackend {
    fn load(&self, namespace: &StateNamespace) -> Option<Map<String, Value>> {
        self.entries.get(namespace).map(|entry| entry.value().clone())
    }

    fn store(&self, namespace: &StateNamespace, state: Map<String, Value>) {
        self.entries.insert(namespace.clone(), state);
    }

    fn remove(&self, namespace: &StateNamespace) {
        self.entries.remove(namespace);
    }

    fn namespaces(&self) -> Vec<StateNamespace> {
        let mut namespaces: Vec<_> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        namespaces.sort();
        namespaces
    }
}

/// The shared, namespaced key/value store read and written by bricks.
///
/// Writes are serialized, so a read always observes the most recently
/// committed write and concurrent merges cannot interleave.
pub struct ModVariableStore {
    backend: Arc<dyn StateBackend>,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<StateChange>,
}

impl ModVariableStore {
    /// Creates a store backed by memory.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(Arc::new(InMemoryStateBackend::new()))
    }

    /// Creates a store over a custom backend.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn StateBackend>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            backend,
            write_lock: Mutex::new(()),
            changes,
        }
    }

    /// Returns a namespace's state as an object (empty if never written).
    #[must_use]
    pub fn get(&self, namespace: &StateNamespace) -> Value {
        Value::Object(self.backend.load(namespace).unwrap_or_default())
    }

    /// Returns one variable of a namespace.
    #[must_use]
    pub fn get_key(&self, namespace: &StateNamespace, key: &str) -> Option<Value> {
        self.backend.load(namespace)?.get(key).cloned()
    }

    /// Writes `data` into a namespace and returns the new namespace state.
    ///
    /// # Errors
    ///
    /// Returns a prop error if `data` is not an object.
    pub fn set(
        &self,
        namespace: &StateNamespace,
        data: Value,
        strategy: MergeStrategy,
    ) -> Result<Value, BrickflowError> {
        let state = {
            let _guard = self.write_lock.lock();
            let current = self.backend.load(namespace).unwrap_or_default();
            let next = merge_state(&current, data, strategy)?;
            self.backend.store(namespace, next.clone());
            Value::Object(next)
        };

        debug!(namespace = %namespace, ?strategy, "State updated");
        // Fails only when there are no subscribers.
        let _ = self.changes.send(StateChange {
            namespace: namespace.clone(),
            state: state.clone(),
        });
        Ok(state)
    }

    /// Atomically reads and rewrites a namespace.
    ///
    /// `update` receives the current state and returns the replacement, or
    /// `None` to leave the namespace untouched. No other write can commit
    /// between the read and the write. Returns the new state if one was
    /// written.
    pub fn update<F>(&self, namespace: &StateNamespace, update: F) -> Option<Value>
    where
        F: FnOnce(&Map<String, Value>) -> Option<Map<String, Value>>,
    {
        let state = {
            let _guard = self.write_lock.lock();
            let current = self.backend.load(namespace).unwrap_or_default();
            let next = update(&current)?;
            self.backend.store(namespace, next.clone());
            Value::Object(next)
        };

        debug!(namespace = %namespace, "State updated");
        let _ = self.changes.send(StateChange {
            namespace: namespace.clone(),
            state: state.clone(),
        });
        Some(state)
    }

    /// Assigns a single variable with a shallow merge.
    ///
    /// # Errors
    ///
    /// Never fails for a shallow merge of a single key; the signature mirrors [`Self::set`].
    pub fn assign(
        &self,
        namespace: &StateNamespace,
        name: &str,
        value: Value,
    ) -> Result<Value, BrickflowError> {
        let mut data = Map::new();
        data.insert(name.to_string(), value);
        self.set(namespace, Value::Object(data), MergeStrategy::Shallow)
    }

    /// Removes a namespace.
    pub fn clear(&self, namespace: &StateNamespace) {
        let _guard = self.write_lock.lock();
        self.backend.remove(namespace);
    }

    /// Removes every namespace owned by a mod, on mod deactivation.
    pub fn clear_mod(&self, mod_id: &str) {
        let _guard = self.write_lock.lock();
        for namespace in self.backend.namespaces() {
            if namespace.belongs_to_mod(mod_id) {
                self.backend.remove(&namespace);
            }
        }
        debug!(mod_id, "Cleared mod state");
    }

    /// Lists the namespaces that hold state.
    #[must_use]
    pub fn namespaces(&self) -> Vec<StateNamespace> {
        self.backend.namespaces()
    }

    /// Subscribes to committed writes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}

impl Default for ModVariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModVariableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModVariableStore")
            .field("backend", &self.backend)
            .field("subscribers", &self.changes.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mod_ns(id: &str) -> StateNamespace {
        StateNamespace::Mod { mod_id: id.to_string() }
    }

    #[test]
    fn test_shallow_merge_writes() {
        let store = ModVariableStore::new();
        let ns = mod_ns("m1");

        store.set(&ns, json!({"a": 1}), MergeStrategy::Shallow).unwrap();
        store.set(&ns, json!({"b": 2}), MergeStrategy::Shallow).unwrap();

        assert_eq!(store.get(&ns), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_replace_writes() {
        let store = ModVariableStore::new();
        let ns = mod_ns("m1");

        store.set(&ns, json!({"a": 1}), MergeStrategy::Replace).unwrap();
        store.set(&ns, json!({"a": 2}), MergeStrategy::Replace).unwrap();

        assert_eq!(store.get(&ns), json!({"a": 2}));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = ModVariableStore::new();
        store.assign(&mod_ns("m1"), "x", json!(1)).unwrap();
        store.assign(&mod_ns("m2"), "x", json!(2)).unwrap();

        assert_eq!(store.get_key(&mod_ns("m1"), "x"), Some(json!(1)));
        assert_eq!(store.get_key(&mod_ns("m2"), "x"), Some(json!(2)));
        assert_eq!(store.get(&StateNamespace::Shared), json!({}));
    }

    #[test]
    fn test_clear_mod() {
        let store = ModVariableStore::new();
        let component = StateNamespace::Component {
            component_id: "button".into(),
            mod_id: Some("m1".into()),
        };
        store.assign(&mod_ns("m1"), "x", json!(1)).unwrap();
        store.assign(&component, "y", json!(1)).unwrap();
        store.assign(&mod_ns("m2"), "x", json!(1)).unwrap();
        store.assign(&StateNamespace::Shared, "z", json!(1)).unwrap();

        store.clear_mod("m1");

        assert_eq!(store.namespaces(), vec![StateNamespace::Shared, mod_ns("m2")]);
    }

    #[tokio::test]
    async fn test_subscribe_receives_changes() {
        let store = ModVariableStore::new();
        let mut rx = store.subscribe();

        store.assign(&mod_ns("m1"), "greeting", json!("Hello")).unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.namespace, mod_ns("m1"));
        assert_eq!(change.state, json!({"greeting": "Hello"}));
    }

    #[test]
    fn test_concurrent_writes_do_not_tear() {
        let store = Arc::new(ModVariableStore::new());
        let ns = mod_ns("m1");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let ns = ns.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        store.assign(&ns, &format!("k{i}"), json!(j)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = store.get(&ns);
        let map = state.as_object().unwrap();
        assert_eq!(map.len(), 8);
        assert!(map.values().all(|v| v == &json!(49)));
    }

    #[test]
    fn test_update_is_atomic_read_modify_write() {
        let store = Arc::new(ModVariableStore::new());
        let ns = mod_ns("m1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let ns = ns.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.update(&ns, |current| {
                            let count = current.get("count").and_then(Value::as_u64).unwrap_or(0);
                            let mut next = current.clone();
                            next.insert("count".to_string(), json!(count + 1));
                            Some(next)
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_key(&ns, "count"), Some(json!(400)));
    }

    #[test]
    fn test_update_can_decline() {
        let store = ModVariableStore::new();
        let ns = mod_ns("m1");
        store.assign(&ns, "a", json!(1)).unwrap();

        assert_eq!(store.update(&ns, |_| None), None);
        assert_eq!(store.get(&ns), json!({"a": 1}));
    }

    #[test]
    fn test_namespace_serde() {
        let ns = StateNamespace::Component {
            component_id: "c".into(),
            mod_id: None,
        };
        assert_eq!(serde_json::to_value(&ns).unwrap(), json!({"scope": "component", "componentId": "c"}));
        assert_eq!(ns.to_string(), "component:c");
    }
}
