//! # Brickflow
//!
//! An execution engine for brick pipelines: the declarative programs that
//! page mods run when a button is clicked, a trigger fires or a panel renders.
//!
//! A pipeline is a sequence of brick invocations. Brickflow provides:
//!
//! - **Expression resolution**: literals, `{{ }}` templates and `@var` paths
//!   resolved against an immutable context
//! - **Sequential execution**: output threading, conditions, root selection and
//!   capability checks for every invocation
//! - **Control flow**: branches, loops, retries and try/except as ordinary bricks
//!   that run nested pipelines
//! - **Mod variables**: namespaced state with merge strategies and async request
//!   tracking
//! - **Tracing**: per-invocation enter/exit records for debugging and analysis
//! - **Static analysis**: validation, variable collection and error annotation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brickflow::prelude::*;
//!
//! let executor = PipelineExecutor::new(Arc::new(BrickRegistry::with_builtins()));
//! let pipeline = Pipeline::new(vec![
//!     BrickInvocation::new(ids::ECHO).with_config("message", "Hello"),
//!     BrickInvocation::new(ids::ASSIGN)
//!         .with_config("variableName", "greeting")
//!         .with_config("value", ConfigValue::var("@input")),
//! ]);
//!
//! let output = executor.run(&pipeline, Value::Null, RunOptions::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod analysis;
pub mod bricks;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod errors;
pub mod expression;
pub mod observability;
pub mod pipeline;
pub mod state;
pub mod subpipeline;
pub mod testing;
pub mod trace;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::analysis::{
        annotate_trace_errors, collect_mod_variable_names, validate_pipeline, Annotation,
        AnnotationSeverity, PipelineVisitor,
    };
    pub use crate::bricks::{ids, Brick, BrickArgs, BrickKind, BrickRegistry, FnBrick};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::ExecutorConfig;
    pub use crate::context::{
        BrickContext, ElementRef, PlatformCapability, PlatformServices, RootMode, RunIdentity,
    };
    pub use crate::errors::{
        BrickExecutionError, BrickNotFoundError, BrickflowError, CancelError, PropError,
        TemplateError,
    };
    pub use crate::expression::{resolve, ConfigValue};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        BrickInvocation, BrickOptions, Pipeline, PipelineExecutor, PipelineThunk, RunOptions,
        RunResult,
    };
    pub use crate::state::{MergeStrategy, ModVariableStore, StateNamespace};
    pub use crate::trace::{InMemoryTraceRecorder, TraceRecord, TraceRecorder};
}
