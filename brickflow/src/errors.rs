//! Error types for the brickflow engine.
//!
//! The taxonomy separates configuration faults (malformed expressions, unknown
//! bricks), which always abort a run, from runtime faults raised by bricks
//! (execution errors, prop errors, cancellation), which a try/except brick may
//! intercept.

use crate::pipeline::InstanceId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for brickflow operations.
#[derive(Debug, Error)]
pub enum BrickflowError {
    /// A template or variable expression could not be parsed.
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// An invocation referenced a brick that is not registered.
    #[error("{0}")]
    BrickNotFound(#[from] BrickNotFoundError),

    /// A brick's `run` rejected.
    #[error("{0}")]
    Execution(#[from] BrickExecutionError),

    /// The run's abort signal fired.
    #[error("{0}")]
    Cancelled(#[from] CancelError),

    /// The pipeline configuration failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrickflowError {
    /// Returns true if a try/except brick is allowed to intercept this error.
    ///
    /// Only runtime faults are catchable. Resolution errors and unknown bricks
    /// indicate a corrupt configuration and abort the whole run.
    #[must_use]
    pub fn is_catchable(&self) -> bool {
        matches!(self, Self::Execution(_) | Self::Cancelled(_))
    }

    /// Returns true if this error was caused by cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the instance id the error is attributed to, if any.
    #[must_use]
    pub fn instance_id(&self) -> Option<&InstanceId> {
        match self {
            Self::Template(e) => e.instance_id.as_ref(),
            Self::BrickNotFound(e) => e.instance_id.as_ref(),
            Self::Execution(e) => e.instance_id.as_ref(),
            Self::Cancelled(e) => e.instance_id.as_ref(),
            Self::Validation(_) | Self::Serialization(_) | Self::Internal(_) => None,
        }
    }

    /// Attributes the error to a brick invocation.
    ///
    /// Existing attribution is kept, so an error raised deep inside a nested
    /// pipeline stays attached to the innermost invocation as it propagates.
    #[must_use]
    pub fn attributed(self, brick_id: &str, instance_id: &InstanceId) -> Self {
        match self {
            Self::Template(mut e) => {
                e.instance_id.get_or_insert_with(|| instance_id.clone());
                Self::Template(e)
            }
            Self::BrickNotFound(mut e) => {
                e.instance_id.get_or_insert_with(|| instance_id.clone());
                Self::BrickNotFound(e)
            }
            Self::Execution(mut e) => {
                if e.instance_id.is_none() {
                    e.instance_id = Some(instance_id.clone());
                    e.brick_id = Some(brick_id.to_string());
                }
                Self::Execution(e)
            }
            Self::Cancelled(mut e) => {
                e.instance_id.get_or_insert_with(|| instance_id.clone());
                Self::Cancelled(e)
            }
            other => other,
        }
    }

    /// Returns the error's type name as shown in trace records.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Template(_) => "TemplateError",
            Self::BrickNotFound(_) => "BrickNotFoundError",
            Self::Execution(e) if e.property.is_some() => "PropError",
            Self::Execution(_) => "BrickExecutionError",
            Self::Cancelled(_) => "CancelError",
            Self::Validation(_) => "PipelineValidationError",
            Self::Serialization(_) => "SerializationError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Converts the error to its serializable form.
    #[must_use]
    pub fn to_serialized(&self) -> SerializedError {
        let (brick_id, property, field) = match self {
            Self::Execution(e) => (e.brick_id.clone(), e.property.clone(), None),
            Self::BrickNotFound(e) => (Some(e.brick_id.clone()), None, None),
            Self::Template(e) => (None, None, e.field.clone()),
            _ => (None, None, None),
        };
        let message = match self {
            Self::Execution(e) => e.message.clone(),
            other => other.to_string(),
        };

        SerializedError {
            name: self.name().to_string(),
            message,
            property: property.or(field),
            brick_id,
            instance_id: self.instance_id().cloned(),
        }
    }
}

impl From<PropError> for BrickflowError {
    fn from(err: PropError) -> Self {
        Self::Execution(err.into())
    }
}

impl From<anyhow::Error> for BrickflowError {
    fn from(err: anyhow::Error) -> Self {
        Self::Execution(BrickExecutionError::new(format!("{err:#}")))
    }
}

impl From<serde_json::Error> for BrickflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised when a template or variable expression is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid expression `{expression}` in field '{}': {reason}", .field.as_deref().unwrap_or("<root>"))]
pub struct TemplateError {
    /// The offending expression text.
    pub expression: String,
    /// Why the expression could not be parsed.
    pub reason: String,
    /// The field path within the invocation (e.g. `config.message`).
    pub field: Option<String>,
    /// The invocation whose configuration contained the expression.
    pub instance_id: Option<InstanceId>,
}

impl TemplateError {
    /// Creates a new template error.
    #[must_use]
    pub fn new(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            reason: reason.into(),
            field: None,
            instance_id: None,
        }
    }

    /// Sets the field path.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Sets the instance id.
    #[must_use]
    pub fn with_instance(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = Some(instance_id);
        self
    }
}

/// Error raised when a brick identifier is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Brick not found: {brick_id}")]
pub struct BrickNotFoundError {
    /// The unknown brick identifier.
    pub brick_id: String,
    /// The invocation referencing it.
    pub instance_id: Option<InstanceId>,
}

impl BrickNotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(brick_id: impl Into<String>) -> Self {
        Self {
            brick_id: brick_id.into(),
            instance_id: None,
        }
    }
}

/// Error raised by a brick's own `run`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BrickExecutionError {
    /// The error message reported by the brick.
    pub message: String,
    /// The brick that raised it.
    pub brick_id: Option<String>,
    /// The invocation that raised it.
    pub instance_id: Option<InstanceId>,
    /// The offending input property, for prop errors.
    pub property: Option<String>,
}

impl BrickExecutionError {
    /// Creates a new execution error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            brick_id: None,
            instance_id: None,
            property: None,
        }
    }

    /// Returns true if this error reports an invalid input property.
    #[must_use]
    pub fn is_prop_error(&self) -> bool {
        self.property.is_some()
    }
}

/// An input validation failure reported by a brick.
///
/// Converts into a [`BrickExecutionError`] carrying the property name, so the
/// failure can be mapped back onto the exact configuration field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid value for '{property}': {message}")]
pub struct PropError {
    /// The offending property.
    pub property: String,
    /// What was wrong with it.
    pub message: String,
}

impl PropError {
    /// Creates a new prop error.
    #[must_use]
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates a prop error for a missing required property.
    #[must_use]
    pub fn missing(property: impl Into<String>) -> Self {
        let property = property.into();
        let message = format!("{property} is required");
        Self { property, message }
    }
}

impl From<PropError> for BrickExecutionError {
    fn from(err: PropError) -> Self {
        Self {
            message: err.message,
            brick_id: None,
            instance_id: None,
            property: Some(err.property),
        }
    }
}

/// Error raised when a run's abort signal fires mid-execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Run cancelled: {reason}")]
pub struct CancelError {
    /// The cancellation reason.
    pub reason: String,
    /// The invocation that observed the cancellation.
    pub instance_id: Option<InstanceId>,
}

impl CancelError {
    /// Creates a new cancel error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            instance_id: None,
        }
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The instances involved in the error.
    pub instance_ids: Vec<InstanceId>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            instance_ids: Vec::new(),
        }
    }

    /// Sets the instances involved.
    #[must_use]
    pub fn with_instances(mut self, instance_ids: Vec<InstanceId>) -> Self {
        self.instance_ids = instance_ids;
        self
    }
}

/// The serializable form of an error, stored in trace records and exposed to
/// except branches as `@error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedError {
    /// The error type name (e.g. `BrickExecutionError`, `PropError`).
    pub name: String,
    /// The error message.
    pub message: String,
    /// The offending property or field, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// The brick that raised the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brick_id: Option<String>,
    /// The invocation that raised the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
}

impl SerializedError {
    /// Converts to a JSON value.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("name".to_string(), serde_json::json!(self.name));
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(ref property) = self.property {
            map.insert("property".to_string(), serde_json::json!(property));
        }
        if let Some(ref brick_id) = self.brick_id {
            map.insert("brickId".to_string(), serde_json::json!(brick_id));
        }
        if let Some(ref instance_id) = self.instance_id {
            map.insert("instanceId".to_string(), serde_json::json!(instance_id.as_str()));
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catchable_errors() {
        let execution: BrickflowError = BrickExecutionError::new("boom").into();
        let cancelled: BrickflowError = CancelError::new("user").into();
        let template: BrickflowError = TemplateError::new("{{", "unclosed").into();
        let not_found: BrickflowError = BrickNotFoundError::new("@acme/missing").into();

        assert!(execution.is_catchable());
        assert!(cancelled.is_catchable());
        assert!(cancelled.is_cancellation());
        assert!(!template.is_catchable());
        assert!(!not_found.is_catchable());
    }

    #[test]
    fn test_prop_error_conversion() {
        let err: BrickflowError = PropError::new("title", "must not be empty").into();
        assert_eq!(err.name(), "PropError");
        assert_eq!(err.to_string(), "must not be empty");

        let serialized = err.to_serialized();
        assert_eq!(serialized.property.as_deref(), Some("title"));
    }

    #[test]
    fn test_attribution_keeps_innermost() {
        let inner = InstanceId::from("inner");
        let outer = InstanceId::from("outer");

        let err: BrickflowError = BrickExecutionError::new("boom").into();
        let err = err.attributed("@acme/inner", &inner).attributed("@acme/outer", &outer);

        assert_eq!(err.instance_id(), Some(&inner));
        let serialized = err.to_serialized();
        assert_eq!(serialized.brick_id.as_deref(), Some("@acme/inner"));
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: BrickflowError = anyhow::anyhow!("request failed").into();
        assert!(err.is_catchable());
        assert_eq!(err.to_string(), "request failed");
    }

    #[test]
    fn test_template_error_display() {
        let err = TemplateError::new("{{ @x", "unclosed interpolation").with_field("config.message");
        assert!(err.to_string().contains("config.message"));
        assert!(err.to_string().contains("unclosed interpolation"));
    }

    #[test]
    fn test_serialized_error_value() {
        let err: BrickflowError = BrickExecutionError::new("boom").into();
        let value = err
            .attributed("@acme/throw", &InstanceId::from("abc"))
            .to_serialized()
            .to_value();

        assert_eq!(value["name"], "BrickExecutionError");
        assert_eq!(value["message"], "boom");
        assert_eq!(value["instanceId"], "abc");
    }
}
