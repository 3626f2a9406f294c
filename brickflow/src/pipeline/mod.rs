//! Pipeline definitions and the executor that interprets them.
//!
//! This module provides:
//! - The wire model of pipelines and brick invocations
//! - Position paths shared by the executor, traces and analyses
//! - Thunks for nested pipelines handed to control-flow bricks
//! - The sequential pipeline executor and its options bundles

mod executor;
mod options;
mod position;
mod spec;
mod thunk;


pub use executor::{ExecutorBuilder, PipelineExecutor, RunResult};
pub use options::{BrickOptions, CompletionHook, RunOptions};
pub use position::{BranchFrame, PositionPath, PositionSegment};
pub use spec::{BrickInvocation, InstanceId, Pipeline};
pub use thunk::PipelineThunk;
