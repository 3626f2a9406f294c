//! Configuration values: literals, templates, variables and nested pipelines.

use super::template::TemplateEngine;
use crate::pipeline::Pipeline;
use serde::de::{Deserialize, Deserializer, Error as _};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Marker key naming an expression's kind on the wire.
pub const TYPE_KEY: &str = "__type__";
/// Marker key holding an expression's payload on the wire.
pub const VALUE_KEY: &str = "__value__";

/// Error raised when a configuration value cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValueError {
    /// The `__type__` marker names an unknown expression kind.
    #[error("unknown expression type '{0}'")]
    UnknownType(String),

    /// The `__value__` payload has the wrong shape.
    #[error("invalid payload for '{kind}' expression: {reason}")]
    InvalidPayload {
        /// The expression kind.
        kind: String,
        /// What was wrong.
        reason: String,
    },
}

/// A value in a brick invocation's configuration.
///
/// On the wire, expressions are objects tagged with `__type__` and
/// `__value__`; every other JSON value is a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// A plain JSON value returned unchanged.
    Literal(Value),
    /// A template string rendered against the context.
    Template {
        /// The template dialect.
        engine: TemplateEngine,
        /// The template source.
        source: String,
    },
    /// A variable reference such as `@profile.name`.
    Var(String),
    /// A nested pipeline handed to the brick as a thunk.
    Pipeline(Arc<Pipeline>),
    /// An array resolved element-wise.
    Array(Vec<ConfigValue>),
    /// An object resolved field-wise.
    Object(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Creates a literal value.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Creates a nunjucks template expression.
    #[must_use]
    pub fn template(source: impl Into<String>) -> Self {
        Self::Template {
            engine: TemplateEngine::Nunjucks,
            source: source.into(),
        }
    }

    /// Creates a mustache template expression.
    #[must_use]
    pub fn mustache(source: impl Into<String>) -> Self {
        Self::Template {
            engine: TemplateEngine::Mustache,
            source: source.into(),
        }
    }

    /// Creates a variable reference.
    #[must_use]
    pub fn var(path: impl Into<String>) -> Self {
        Self::Var(path.into())
    }

    /// Creates a nested pipeline expression.
    #[must_use]
    pub fn pipeline(pipeline: impl Into<Pipeline>) -> Self {
        Self::Pipeline(Arc::new(pipeline.into()))
    }

    /// Returns the nested pipeline, if this is a pipeline expression.
    #[must_use]
    pub fn as_pipeline(&self) -> Option<&Arc<Pipeline>> {
        match self {
            Self::Pipeline(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    /// Returns true if resolving this value needs a context.
    #[must_use]
    pub fn is_expression(&self) -> bool {
        match self {
            Self::Literal(_) => false,
            Self::Template { .. } | Self::Var(_) | Self::Pipeline(_) => true,
            Self::Array(items) => items.iter().any(Self::is_expression),
            Self::Object(fields) => fields.values().any(Self::is_expression),
        }
    }

    /// Converts back to the wire representation.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Template { engine, source } => tagged(engine.as_str(), Value::String(source.clone())),
            Self::Var(path) => tagged("var", Value::String(path.clone())),
            Self::Pipeline(pipeline) => tagged(
                "pipeline",
                serde_json::to_value(pipeline.as_ref()).unwrap_or(Value::Null),
            ),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

fn tagged(kind: &str, payload: Value) -> Value {
    let mut map = Map::new();
    map.insert(TYPE_KEY.to_string(), Value::String(kind.to_string()));
    map.insert(VALUE_KEY.to_string(), payload);
    Value::Object(map)
}

impl ConfigValue {
    /// Decodes the wire form, where `__type__`/`__value__` objects mark
    /// expressions and every other value is literal.
    pub fn from_wire(value: Value) -> Result<Self, ConfigValueError> {
        match value {
            Value::Object(mut map) if map.contains_key(TYPE_KEY) => {
                let kind = match map.remove(TYPE_KEY) {
                    Some(Value::String(kind)) => kind,
                    other => {
                        return Err(ConfigValueError::UnknownType(
                            other.map(|v| v.to_string()).unwrap_or_default(),
                        ))
                    }
                };
                let payload = map.remove(VALUE_KEY).unwrap_or(Value::Null);
                let invalid = |reason: &str| ConfigValueError::InvalidPayload {
                    kind: kind.clone(),
                    reason: reason.to_string(),
                };

                if let Some(engine) = TemplateEngine::from_name(&kind) {
                    return match payload {
                        Value::String(source) => Ok(Self::Template { engine, source }),
                        _ => Err(invalid("expected a string")),
                    };
                }
                match kind.as_str() {
                    "var" => match payload {
                        Value::String(path) => Ok(Self::Var(path)),
                        _ => Err(invalid("expected a string")),
                    },
                    "pipeline" => {
                        let payload = if payload.is_null() { Value::Array(Vec::new()) } else { payload };
                        serde_json::from_value::<Pipeline>(payload)
                            .map(|pipeline| Self::Pipeline(Arc::new(pipeline)))
                            .map_err(|err| invalid(&err.to_string()))
                    }
                    _ => Err(ConfigValueError::UnknownType(kind.clone())),
                }
            }
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| Ok((key, Self::from_wire(value)?)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Self::Object),
            Value::Array(items) => items
                .into_iter()
                .map(Self::from_wire)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Array),
            literal => Ok(Self::Literal(literal)),
        }
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConfigValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_wire(value).map_err(D::Error::custom)
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }
}

impl From<Pipeline> for ConfigValue {
    fn from(pipeline: Pipeline) -> Self {
        Self::Pipeline(Arc::new(pipeline))
    }
}
