//! Test fixtures for pipeline testing.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::bricks::{Brick, BrickRegistry};
use crate::config::ExecutorConfig;
use crate::context::{BrickContext, PlatformServices, INPUT_KEY, MOD_KEY, OPTIONS_KEY};
use crate::pipeline::{Pipeline, PipelineExecutor, RunOptions, RunResult};
use crate::state::{ModVariableStore, StateNamespace};
use crate::trace::{InMemoryTraceRecorder, TraceRecord, TraceRecorder};

/// A builder for expression contexts.
#[derive(Debug, Default)]
pub struct TestContext {
    /// Entries of the context, keyed with their `@` prefix.
    pub entries: Map<String, Value>,
}

impl TestContext {
    /// Creates an empty test context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `@input`.
    #[must_use]
    pub fn with_input(mut self, value: Value) -> Self {
        self.entries.insert(INPUT_KEY.to_string(), value);
        self
    }

    /// Adds an output binding; `name` is prefixed with `@` when needed.
    #[must_use]
    pub fn with_binding(mut self, name: &str, value: Value) -> Self {
        let key = if name.starts_with('@') {
            name.to_string()
        } else {
            format!("@{name}")
        };
        self.entries.insert(key, value);
        self
    }

    /// Sets `@mod`.
    #[must_use]
    pub fn with_mod(mut self, value: Value) -> Self {
        self.entries.insert(MOD_KEY.to_string(), value);
        self
    }

    /// Sets `@options`.
    #[must_use]
    pub fn with_options(mut self, value: Value) -> Self {
        self.entries.insert(OPTIONS_KEY.to_string(), value);
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> BrickContext {
        BrickContext::from_map(self.entries)
    }
}

/// An executor wired to collaborators a test can inspect.
///
/// The registry starts with the built-in bricks.
pub struct TestHarness {
    /// The brick registry.
    pub registry: Arc<BrickRegistry>,
    /// The trace recorder.
    pub recorder: Arc<InMemoryTraceRecorder>,
    /// The mod variable store.
    pub state: Arc<ModVariableStore>,
    /// The executor.
    pub executor: PipelineExecutor,
}

impl TestHarness {
    /// Creates a harness with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    /// Creates a harness with a custom configuration.
    #[must_use]
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates a harness over a custom platform.
    #[must_use]
    pub fn with_platform(platform: Arc<dyn PlatformServices>) -> Self {
        Self::build(ExecutorConfig::default(), Some(platform))
    }

    fn build(config: ExecutorConfig, platform: Option<Arc<dyn PlatformServices>>) -> Self {
        let registry = Arc::new(BrickRegistry::with_builtins());
        let recorder = Arc::new(InMemoryTraceRecorder::with_retention(
            config.trace_retention.clone(),
        ));
        let state = Arc::new(ModVariableStore::new());

        let mut builder = PipelineExecutor::builder(registry.clone())
            .with_recorder(recorder.clone())
            .with_state(state.clone())
            .with_config(config);
        if let Some(platform) = platform {
            builder = builder.with_platform(platform);
        }

        Self {
            registry,
            recorder,
            state,
            executor: builder.build(),
        }
    }

    /// Registers a brick and returns a handle for inspecting it.
    pub fn register<B: Brick + 'static>(&self, brick: B) -> Arc<B> {
        let brick = Arc::new(brick);
        self.registry.register(brick.clone());
        brick
    }

    /// Runs a pipeline with default options.
    pub async fn run(&self, pipeline: &Pipeline, input: Value) -> RunResult {
        self.run_with(pipeline, input, RunOptions::new()).await
    }

    /// Runs a pipeline with custom options.
    pub async fn run_with(&self, pipeline: &Pipeline, input: Value, options: RunOptions) -> RunResult {
        self.executor.run_detailed(pipeline, input, options).await
    }

    /// Returns the trace records of a run.
    #[must_use]
    pub fn records(&self, result: &RunResult) -> Vec<TraceRecord> {
        self.recorder.run_records(result.run_id)
    }

    /// Returns the variables of a mod.
    #[must_use]
    pub fn mod_state(&self, mod_id: &str) -> Value {
        self.state.get(&StateNamespace::Mod {
            mod_id: mod_id.to_string(),
        })
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
