//! Findings mapped onto configuration fields.

use crate::pipeline::{InstanceId, PositionPath};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious an annotation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationSeverity {
    /// The configuration cannot run as written.
    Error,
    /// The configuration runs but is likely wrong, or the finding is stale.
    Warning,
    /// Informational.
    Info,
}

impl fmt::Display for AnnotationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        f.write_str(name)
    }
}

/// A finding attached to an invocation and, optionally, one of its fields.
///
/// Annotations are recomputed from the latest analysis or trace; they are not
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// The invocation's position.
    pub position: PositionPath,
    /// The invocation.
    pub instance_id: InstanceId,
    /// The field within the invocation (e.g. `config.message`, `if`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Severity.
    pub severity: AnnotationSeverity,
    /// Human-readable message.
    pub message: String,
    /// The analysis that produced the annotation.
    pub analysis: String,
}

impl Annotation {
    /// Creates an annotation.
    #[must_use]
    pub fn new(
        analysis: impl Into<String>,
        severity: AnnotationSeverity,
        position: PositionPath,
        instance_id: InstanceId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            position,
            instance_id,
            field: None,
            severity,
            message: message.into(),
            analysis: analysis.into(),
        }
    }

    /// Sets the field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Returns the full configuration path, e.g. `0.if.0.config.title`.
    #[must_use]
    pub fn path(&self) -> String {
        match (&self.field, self.position.is_root()) {
            (None, _) => self.position.to_string(),
            (Some(field), true) => field.clone(),
            (Some(field), false) => format!("{}.{field}", self.position),
        }
    }

    /// Returns true for error annotations.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == AnnotationSeverity::Error
    }
}
