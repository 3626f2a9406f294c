//! Rendered brick arguments.

use crate::errors::PropError;
use crate::expression::is_truthy;
use crate::pipeline::PipelineThunk;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The arguments a brick receives: resolved values plus nested pipelines.
///
/// Pipeline-valued fields appear in [`BrickArgs::values`] as their wire
/// representation and in [`BrickArgs::pipeline`] as executable thunks.
#[derive(Debug, Clone, Default)]
pub struct BrickArgs {
    values: Map<String, Value>,
    pipelines: BTreeMap<String, PipelineThunk>,
}

impl BrickArgs {
    /// Creates arguments from resolved values and thunks.
    #[must_use]
    pub fn new(values: Map<String, Value>, pipelines: BTreeMap<String, PipelineThunk>) -> Self {
        Self { values, pipelines }
    }

    /// Creates arguments from a JSON object, without thunks.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self::new(values, BTreeMap::new()),
            _ => Self::default(),
        }
    }

    /// Returns a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns a value, treating `null` as absent.
    #[must_use]
    pub fn get_present(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|value| !value.is_null())
    }

    /// Returns a required value.
    pub fn require(&self, key: &str) -> Result<&Value, PropError> {
        self.get_present(key).ok_or_else(|| PropError::missing(key))
    }

    /// Returns a string value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Returns a required string value.
    pub fn require_str(&self, key: &str) -> Result<&str, PropError> {
        match self.require(key)? {
            Value::String(s) => Ok(s),
            other => Err(PropError::new(key, format!("expected a string, got {other}"))),
        }
    }

    /// Returns a truthiness flag, or `default` when absent.
    #[must_use]
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.get_present(key).map_or(default, |value| is_truthy(Some(value)))
    }

    /// Returns a non-negative integer, or `default` when absent.
    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64, PropError> {
        match self.get_present(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .ok_or_else(|| PropError::new(key, "expected a non-negative number")),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| PropError::new(key, "expected a non-negative number")),
            Some(other) => Err(PropError::new(key, format!("expected a number, got {other}"))),
        }
    }

    /// Deserializes a value into `T`, returning `None` when absent.
    pub fn parse<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PropError> {
        self.get_present(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|err| PropError::new(key, err.to_string()))
            })
            .transpose()
    }

    /// Returns a nested pipeline thunk.
    #[must_use]
    pub fn pipeline(&self, key: &str) -> Option<&PipelineThunk> {
        self.pipelines.get(key)
    }

    /// Returns a required nested pipeline thunk.
    pub fn require_pipeline(&self, key: &str) -> Result<&PipelineThunk, PropError> {
        self.pipeline(key).ok_or_else(|| PropError::missing(key))
    }

    /// Returns the resolved values.
    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Returns the nested pipeline thunks by field path.
    #[must_use]
    pub fn pipelines(&self) -> &BTreeMap<String, PipelineThunk> {
        &self.pipelines
    }

    /// Converts the resolved values to a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        let args = BrickArgs::from_value(json!({
            "message": "hi",
            "count": 3,
            "enabled": "no",
            "empty": null
        }));

        assert_eq!(args.require_str("message").unwrap(), "hi");
        assert_eq!(args.get_u64("count", 0).unwrap(), 3);
        assert_eq!(args.get_u64("missing", 7).unwrap(), 7);
        assert!(!args.flag("enabled", true));
        assert!(args.flag("empty", true));
        assert!(args.require("empty").is_err());
    }

    #[test]
    fn test_prop_errors_name_property() {
        let args = BrickArgs::from_value(json!({"count": "many", "message": 5}));

        assert_eq!(args.get_u64("count", 0).unwrap_err().property, "count");
        assert_eq!(args.require_str("message").unwrap_err().property, "message");
        assert_eq!(args.require_pipeline("body").unwrap_err().property, "body");
    }

    #[test]
    fn test_parse() {
        let args = BrickArgs::from_value(json!({"items": [1, 2]}));
        let items: Option<Vec<u32>> = args.parse("items").unwrap();
        assert_eq!(items, Some(vec![1, 2]));
        assert!(args.parse::<Vec<u32>>("missing").unwrap().is_none());
    }
}
