//! Nested pipelines handed to control-flow bricks.

use super::{Pipeline, PositionPath};
use crate::context::BrickContext;
use std::sync::Arc;

/// An unexecuted nested pipeline bound to the context it was rendered in.
///
/// Only control-flow bricks can execute a thunk, through
/// [`BrickOptions::run_pipeline`](super::BrickOptions::run_pipeline) and its
/// siblings.
#[derive(Debug, Clone)]
pub struct PipelineThunk {
    pipeline: Arc<Pipeline>,
    context: BrickContext,
    position: PositionPath,
}

impl PipelineThunk {
    /// Creates a thunk.
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>, context: BrickContext, position: PositionPath) -> Self {
        Self {
            pipeline,
            context,
            position,
        }
    }

    /// Returns the nested pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Returns the context captured at render time.
    #[must_use]
    pub fn context(&self) -> &BrickContext {
        &self.context
    }

    /// Returns the position of the nested pipeline in the tree.
    #[must_use]
    pub fn position(&self) -> &PositionPath {
        &self.position
    }

    /// Returns true if the nested pipeline has no invocations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipeline.is_empty()
    }
}
