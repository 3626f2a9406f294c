//! Run identity for tracking pipeline executions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a pipeline run and the mod component that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunIdentity {
    /// The unique ID for this run.
    pub run_id: Uuid,

    /// The run that spawned this one, for detached runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<Uuid>,

    /// The top-level run a detached run descends from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_run_id: Option<Uuid>,

    /// The mod this run belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<String>,

    /// The mod component (e.g. a button or trigger) that started the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl RunIdentity {
    /// Creates a new run identity with a generated, time-ordered run ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_run_id(Uuid::now_v7())
    }

    /// Creates a run identity with a specific run ID.
    #[must_use]
    pub fn with_run_id(run_id: Uuid) -> Self {
        Self {
            run_id,
            parent_run_id: None,
            root_run_id: None,
            mod_id: None,
            component_id: None,
        }
    }

    /// Sets the mod ID.
    #[must_use]
    pub fn with_mod_id(mut self, mod_id: impl Into<String>) -> Self {
        self.mod_id = Some(mod_id.into());
        self
    }

    /// Sets the component ID.
    #[must_use]
    pub fn with_component_id(mut self, component_id: impl Into<String>) -> Self {
        self.component_id = Some(component_id.into());
        self
    }

    /// Derives the identity of a detached child run.
    ///
    /// The child keeps the mod and component so its traces and state writes
    /// land in the same scope as the parent's.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            parent_run_id: Some(self.run_id),
            root_run_id: Some(self.top_level_run_id()),
            mod_id: self.mod_id.clone(),
            component_id: self.component_id.clone(),
        }
    }

    /// Returns the ID of the top-level run, which is this run unless it is
    /// detached.
    #[must_use]
    pub fn top_level_run_id(&self) -> Uuid {
        self.root_run_id.unwrap_or(self.run_id)
    }

    /// Returns the top-level owner used for trace retention.
    #[must_use]
    pub fn owner(&self) -> String {
        self.component_id
            .clone()
            .or_else(|| self.mod_id.clone())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    /// Converts to the value exposed as `@run`.
    #[must_use]
    pub fn to_context_value(&self) -> serde_json::Value {
        serde_json::json!({
            "runId": self.run_id.to_string(),
            "parentRunId": self.parent_run_id.map(|id| id.to_string()),
            "modId": self.mod_id,
            "componentId": self.component_id,
        })
    }
}
