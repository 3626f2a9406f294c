//! Span-bound logger for brick invocations.

use crate::context::RunIdentity;
use crate::pipeline::InstanceId;
use serde::Serialize;
use tracing::Span;
use uuid::Uuid;

/// The identity a [`BrickLogger`] reports under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerContext {
    /// The run.
    pub run_id: Uuid,
    /// The mod.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<String>,
    /// The mod component.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    /// The brick being invoked.
    pub brick_id: String,
    /// The invocation.
    pub instance_id: InstanceId,
}

impl LoggerContext {
    /// Creates a context from a run identity and invocation.
    #[must_use]
    pub fn new(identity: &RunIdentity, brick_id: &str, instance_id: &InstanceId) -> Self {
        Self {
            run_id: identity.run_id,
            mod_id: identity.mod_id.clone(),
            component_id: identity.component_id.clone(),
            brick_id: brick_id.to_string(),
            instance_id: instance_id.clone(),
        }
    }
}

/// A logger bound to the current mod, component and invocation.
///
/// Messages are emitted inside the invocation's span, so subscriber output
/// carries the run and instance ids.
#[derive(Debug, Clone)]
pub struct BrickLogger {
    span: Span,
    context: LoggerContext,
}

impl BrickLogger {
    /// Creates a logger and its span.
    #[must_use]
    pub fn new(context: LoggerContext) -> Self {
        let span = tracing::info_span!(
            "brick",
            run_id = %context.run_id,
            mod_id = context.mod_id.as_deref().unwrap_or(""),
            component_id = context.component_id.as_deref().unwrap_or(""),
            brick_id = %context.brick_id,
            instance_id = %context.instance_id,
        );
        Self { span, context }
    }

    /// Returns the invocation span.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Returns the logger identity.
    #[must_use]
    pub fn context(&self) -> &LoggerContext {
        &self.context
    }

    /// Logs at debug level.
    pub fn debug(&self, message: &str) {
        self.span.in_scope(|| tracing::debug!(target: "brickflow::brick", "{}", message));
    }

    /// Logs at info level.
    pub fn info(&self, message: &str) {
        self.span.in_scope(|| tracing::info!(target: "brickflow::brick", "{}", message));
    }

    /// Logs at warn level.
    pub fn warn(&self, message: &str) {
        self.span.in_scope(|| tracing::warn!(target: "brickflow::brick", "{}", message));
    }

    /// Logs at error level.
    pub fn error(&self, message: &str) {
        self.span.in_scope(|| tracing::error!(target: "brickflow::brick", "{}", message));
    }
}
