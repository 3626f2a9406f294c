//! Trace record types.

use crate::errors::SerializedError;
use crate::pipeline::{BranchFrame, InstanceId, PositionPath};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The state of a traced invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceOutcome {
    /// Entered but not yet exited. Readers treat this as still running.
    Running,
    /// Not executed (false condition or preview of an impure brick).
    Skipped {
        /// Why the invocation was skipped.
        reason: String,
    },
    /// Completed successfully.
    Succeeded {
        /// The brick output (`null` when values are not traced).
        output: Value,
    },
    /// Completed with an error.
    Failed {
        /// The serialized error.
        error: SerializedError,
    },
}

impl TraceOutcome {
    /// Returns true once the invocation has finished one way or another.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Identifies one execution of an invocation within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceKey {
    /// The run.
    pub run_id: Uuid,
    /// The invocation.
    pub instance_id: InstanceId,
    /// Loop/retry frames distinguishing repeated executions.
    pub branches: Vec<BranchFrame>,
}

/// The payload of an enter event.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    /// The run.
    pub run_id: Uuid,
    /// The top-level run, when `run_id` is a detached run.
    pub root_run_id: Option<Uuid>,
    /// The top-level owner of the run (component or mod).
    pub owner: String,
    /// The invocation.
    pub instance_id: InstanceId,
    /// The brick being invoked.
    pub brick_id: String,
    /// The invocation's position in the pipeline tree.
    pub position: PositionPath,
    /// Loop/retry frames.
    pub branches: Vec<BranchFrame>,
    /// The rendered arguments (`null` when values are not traced).
    pub rendered_args: Value,
    /// Fingerprint of the invocation configuration.
    pub config_hash: String,
    /// When the invocation was entered.
    pub started_at: Timestamp,
}

impl TraceEntry {
    /// Returns the key of this execution.
    #[must_use]
    pub fn key(&self) -> TraceKey {
        TraceKey {
            run_id: self.run_id,
            instance_id: self.instance_id.clone(),
            branches: self.branches.clone(),
        }
    }
}

/// One traced execution of a brick invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    /// The run.
    pub run_id: Uuid,
    /// The top-level run, when `run_id` is a detached run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_run_id: Option<Uuid>,
    /// The top-level owner of the run.
    pub owner: String,
    /// The invocation.
    pub instance_id: InstanceId,
    /// The brick invoked.
    pub brick_id: String,
    /// The invocation's position in the pipeline tree.
    pub position: PositionPath,
    /// Loop/retry frames.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchFrame>,
    /// The rendered arguments.
    pub rendered_args: Value,
    /// Fingerprint of the invocation configuration when it ran.
    pub config_hash: String,
    /// When the invocation was entered.
    pub started_at: Timestamp,
    /// When the invocation finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    /// The outcome.
    #[serde(flatten)]
    pub outcome: TraceOutcome,
}

impl TraceRecord {
    /// Creates a record from an enter event.
    #[must_use]
    pub fn from_entry(entry: TraceEntry, outcome: TraceOutcome) -> Self {
        let ended_at = outcome.is_terminal().then_some(entry.started_at);
        Self {
            run_id: entry.run_id,
            root_run_id: entry.root_run_id,
            owner: entry.owner,
            instance_id: entry.instance_id,
            brick_id: entry.brick_id,
            position: entry.position,
            branches: entry.branches,
            rendered_args: entry.rendered_args,
            config_hash: entry.config_hash,
            started_at: entry.started_at,
            ended_at,
            outcome,
        }
    }

    /// Returns the key of this execution.
    #[must_use]
    pub fn key(&self) -> TraceKey {
        TraceKey {
            run_id: self.run_id,
            instance_id: self.instance_id.clone(),
            branches: self.branches.clone(),
        }
    }

    /// Returns true if the record holds an error.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TraceOutcome::Failed { .. })
    }

    /// Returns the error, if the record failed.
    #[must_use]
    pub fn error(&self) -> Option<&SerializedError> {
        match &self.outcome {
            TraceOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Returns the elapsed time in milliseconds, once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|ended| (ended - self.started_at).num_milliseconds())
    }
}
