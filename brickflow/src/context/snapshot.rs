//! Immutable context snapshots.

use super::INPUT_KEY;
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;

/// An immutable snapshot of the values visible to expression resolution.
///
/// Each invocation derives a new context rather than mutating the previous
/// one, so a nested pipeline can never change what its parent sees. Cloning
/// is cheap since the underlying map is shared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrickContext {
    values: Arc<Map<String, Value>>,
}

impl BrickContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context from a map of entries.
    #[must_use]
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    /// Creates a context from a JSON value.
    ///
    /// Objects become the context entries directly; any other value becomes
    /// the `@input` entry.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            Value::Null => Self::new(),
            other => Self::new().with_input(other),
        }
    }

    /// Returns a new context with `@input` set to `value`.
    #[must_use]
    pub fn with_input(&self, value: Value) -> Self {
        self.with_entry(INPUT_KEY, value)
    }

    /// Returns a new context with an output binding.
    ///
    /// The name is prefixed with `@` unless it already carries one.
    #[must_use]
    pub fn with_binding(&self, name: &str, value: Value) -> Self {
        if name.starts_with('@') {
            self.with_entry(name, value)
        } else {
            self.with_entry(&format!("@{name}"), value)
        }
    }

    /// Returns a new context with a raw entry set.
    #[must_use]
    pub fn with_entry(&self, key: &str, value: Value) -> Self {
        let mut values = (*self.values).clone();
        values.insert(key.to_string(), value);
        Self::from_map(values)
    }

    /// Returns a new context with all of `extra` layered on top.
    #[must_use]
    pub fn merged(&self, extra: &Map<String, Value>) -> Self {
        if extra.is_empty() {
            return self.clone();
        }
        let mut values = (*self.values).clone();
        for (key, value) in extra {
            values.insert(key.clone(), value.clone());
        }
        Self::from_map(values)
    }

    /// Gets an entry by exact key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Looks up a variable name, trying `@name` before the bare `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let bare = name.trim_start_matches('@');
        self.values
            .get(&format!("@{bare}"))
            .or_else(|| self.values.get(bare))
    }

    /// Returns the `@input` entry.
    #[must_use]
    pub fn input(&self) -> Option<&Value> {
        self.get(INPUT_KEY)
    }

    /// Returns true if the context has an entry for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the context entries.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the context has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object((*self.values).clone())
    }
}

impl Serialize for BrickContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl From<Map<String, Value>> for BrickContext {
    fn from(values: Map<String, Value>) -> Self {
        Self::from_map(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_input_does_not_mutate_original() {
        let base = BrickContext::new();
        let next = base.with_input(json!("Hello"));

        assert!(base.input().is_none());
        assert_eq!(next.input(), Some(&json!("Hello")));
    }

    #[test]
    fn test_binding_prefix() {
        let ctx = BrickContext::new()
            .with_binding("profile", json!({"name": "Ada"}))
            .with_binding("@count", json!(2));

        assert!(ctx.contains_key("@profile"));
        assert!(ctx.contains_key("@count"));
        assert!(!ctx.contains_key("@@count"));
    }

    #[test]
    fn test_lookup_prefers_prefixed_key() {
        let ctx = BrickContext::from_value(json!({"x": 1, "@x": 2, "y": 3}));

        assert_eq!(ctx.lookup("@x"), Some(&json!(2)));
        assert_eq!(ctx.lookup("y"), Some(&json!(3)));
        assert_eq!(ctx.lookup("@y"), Some(&json!(3)));
        assert!(ctx.lookup("@z").is_none());
    }

    #[test]
    fn test_from_scalar_value() {
        let ctx = BrickContext::from_value(json!(42));
        assert_eq!(ctx.input(), Some(&json!(42)));
        assert!(BrickContext::from_value(Value::Null).is_empty());
    }

    #[test]
    fn test_merged_and_serialize() {
        let mut extra = Map::new();
        extra.insert("@element".to_string(), json!("a"));

        let ctx = BrickContext::new().with_input(json!(1)).merged(&extra);
        let serialized = serde_json::to_value(&ctx).unwrap();

        assert_eq!(serialized, json!({"@input": 1, "@element": "a"}));
    }
}
