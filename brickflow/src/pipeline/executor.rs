//! The pipeline executor.
//!
//! Invocations run strictly in sequence: each one's condition and arguments
//! are resolved against the context produced by its predecessor. Control-flow
//! bricks re-enter the executor through [`BrickOptions`] to run the nested
//! pipelines they were handed as thunks.

use super::options::{BrickOptions, CompletionHook, RunOptions, SubPipelineRunner};
use super::{BranchFrame, BrickInvocation, InstanceId, Pipeline, PipelineThunk, PositionPath};
use crate::bricks::{Brick, BrickKind, BrickRegistry};
use crate::cancellation::CancellationToken;
use crate::config::{DetachedAbortPolicy, ExecutorConfig};
use crate::context::{
    BrickContext, ElementRef, PlatformServices, RootResolver, RunIdentity, SelectorRootResolver,
    StaticPlatform, MOD_KEY, OPTIONS_KEY, RUN_KEY,
};
use crate::errors::{BrickExecutionError, BrickflowError, CancelError, TemplateError};
use crate::expression::{is_truthy, render_args, resolve_optional};
use crate::observability::{BrickLogger, LoggerContext};
use crate::state::{ModVariableStore, StateNamespace};
use crate::subpipeline::{DetachedRunInfo, DetachedRunTracker};
use crate::trace::{InMemoryTraceRecorder, TraceEntry, TraceRecorder};
use crate::utils::{iso_timestamp, now_utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// The per-run state threaded through nested pipelines.
#[derive(Debug, Clone)]
pub(crate) struct RunFrame {
    pub(crate) identity: RunIdentity,
    pub(crate) abort: Arc<CancellationToken>,
    pub(crate) root: ElementRef,
    pub(crate) depth: u32,
    pub(crate) branches: Vec<BranchFrame>,
    pub(crate) preview: bool,
    pub(crate) trace_values: bool,
}

impl RunFrame {
    /// Returns the frame of a nested pipeline, optionally inside a new branch.
    pub(crate) fn nested(&self, branch: Option<BranchFrame>) -> Self {
        let mut frame = self.clone();
        frame.depth += 1;
        frame.branches.extend(branch);
        frame
    }
}

/// What happened to one invocation.
enum Step {
    Skipped,
    Completed { value: Value, kind: BrickKind },
}

/// The result of a top-level run.
#[derive(Debug)]
pub struct RunResult {
    /// The run ID, usable to query its trace records.
    pub run_id: Uuid,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// The final value, or the error that aborted the run.
    pub result: Result<Value, BrickflowError>,
}

impl RunResult {
    /// Returns true if the run completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Returns the final value of a completed run.
    #[must_use]
    pub fn output(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    /// Returns the error of a failed run.
    #[must_use]
    pub fn error(&self) -> Option<&BrickflowError> {
        self.result.as_ref().err()
    }

    /// Converts into the underlying result.
    pub fn into_result(self) -> Result<Value, BrickflowError> {
        self.result
    }
}

struct ExecutorInner {
    registry: Arc<BrickRegistry>,
    recorder: Arc<dyn TraceRecorder>,
    state: Arc<ModVariableStore>,
    platform: Arc<dyn PlatformServices>,
    root_resolver: Arc<dyn RootResolver>,
    config: ExecutorConfig,
    detached: DetachedRunTracker,
}

/// Builder for [`PipelineExecutor`].
#[must_use]
pub struct ExecutorBuilder {
    registry: Arc<BrickRegistry>,
    recorder: Option<Arc<dyn TraceRecorder>>,
    state: Option<Arc<ModVariableStore>>,
    platform: Option<Arc<dyn PlatformServices>>,
    root_resolver: Option<Arc<dyn RootResolver>>,
    config: ExecutorConfig,
}

impl ExecutorBuilder {
    fn new(registry: Arc<BrickRegistry>) -> Self {
        Self {
            registry,
            recorder: None,
            state: None,
            platform: None,
            root_resolver: None,
            config: ExecutorConfig::default(),
        }
    }

    /// Sets the trace recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn TraceRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Sets the mod variable store.
    pub fn with_state(mut self, state: Arc<ModVariableStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the platform services.
    pub fn with_platform(mut self, platform: Arc<dyn PlatformServices>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Sets the root resolver.
    pub fn with_root_resolver(mut self, resolver: Arc<dyn RootResolver>) -> Self {
        self.root_resolver = Some(resolver);
        self
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the executor.
    #[must_use]
    pub fn build(self) -> PipelineExecutor {
        let retention = self.config.trace_retention.clone();
        PipelineExecutor {
            inner: Arc::new(ExecutorInner {
                registry: self.registry,
                recorder: self
                    .recorder
                    .unwrap_or_else(|| Arc::new(InMemoryTraceRecorder::with_retention(retention))),
                state: self.state.unwrap_or_else(|| Arc::new(ModVariableStore::new())),
                platform: self
                    .platform
                    .unwrap_or_else(|| Arc::new(StaticPlatform::default())),
                root_resolver: self
                    .root_resolver
                    .unwrap_or_else(|| Arc::new(SelectorRootResolver)),
                config: self.config,
                detached: DetachedRunTracker::new(),
            }),
        }
    }
}

/// Interprets pipelines against a brick registry.
///
/// Cloning is cheap; clones share the registry, recorder, store and detached
/// run tracker.
#[derive(Clone)]
pub struct PipelineExecutor {
    inner: Arc<ExecutorInner>,
}

impl PipelineExecutor {
    /// Creates an executor with default collaborators.
    #[must_use]
    pub fn new(registry: Arc<BrickRegistry>) -> Self {
        Self::builder(registry).build()
    }

    /// Creates a builder.
    pub fn builder(registry: Arc<BrickRegistry>) -> ExecutorBuilder {
        ExecutorBuilder::new(registry)
    }

    /// Returns the brick registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<BrickRegistry> {
        &self.inner.registry
    }

    /// Returns the trace recorder.
    #[must_use]
    pub fn recorder(&self) -> &Arc<dyn TraceRecorder> {
        &self.inner.recorder
    }

    /// Returns the mod variable store.
    #[must_use]
    pub fn state(&self) -> &Arc<ModVariableStore> {
        &self.inner.state
    }

    /// Returns the platform services.
    #[must_use]
    pub fn platform(&self) -> &Arc<dyn PlatformServices> {
        &self.inner.platform
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Returns the tracker of detached runs.
    #[must_use]
    pub fn detached_runs(&self) -> &DetachedRunTracker {
        &self.inner.detached
    }

    /// Runs a pipeline and returns its final value.
    ///
    /// `input` seeds the context: an object provides named entries, any other
    /// non-null value becomes `@input`.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        input: Value,
        options: RunOptions,
    ) -> Result<Value, BrickflowError> {
        self.run_detailed(pipeline, input, options).await.into_result()
    }

    /// Runs a pipeline and returns the run ID and duration with its result.
    pub async fn run_detailed(
        &self,
        pipeline: &Pipeline,
        input: Value,
        options: RunOptions,
    ) -> RunResult {
        let start = Instant::now();
        let mut identity = options.run_id.map_or_else(RunIdentity::new, RunIdentity::with_run_id);
        if let Some(mod_id) = &options.mod_id {
            identity = identity.with_mod_id(mod_id.clone());
        }
        if let Some(component_id) = &options.component_id {
            identity = identity.with_component_id(component_id.clone());
        }
        let run_id = identity.run_id;
        let owner = identity.owner();

        tracing::info!(
            run_id = %run_id,
            owner = %owner,
            invocations = pipeline.len(),
            preview = options.preview,
            "Pipeline run started"
        );

        let result = self.run_top_level(pipeline, input, identity, options).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => tracing::info!(
                run_id = %run_id,
                owner = %owner,
                duration_ms,
                "Pipeline run completed"
            ),
            Err(err) => tracing::warn!(
                run_id = %run_id,
                owner = %owner,
                duration_ms,
                error = %err,
                instance_id = err.instance_id().map(|id| id.as_str()).unwrap_or(""),
                "Pipeline run failed"
            ),
        }

        RunResult {
            run_id,
            duration_ms,
            result,
        }
    }

    async fn run_top_level(
        &self,
        pipeline: &Pipeline,
        input: Value,
        identity: RunIdentity,
        options: RunOptions,
    ) -> Result<Value, BrickflowError> {
        if self.inner.config.validate_instance_ids {
            pipeline.validate()?;
        }

        let context = BrickContext::from_value(input)
            .with_entry(RUN_KEY, identity.to_context_value())
            .with_entry(
                OPTIONS_KEY,
                options
                    .mod_options
                    .unwrap_or_else(|| Value::Object(Map::new())),
            );

        let frame = RunFrame {
            identity,
            abort: options
                .abort_signal
                .unwrap_or_else(|| Arc::new(CancellationToken::new())),
            root: options.root,
            depth: 0,
            branches: Vec::new(),
            preview: options.preview,
            trace_values: options
                .trace_values
                .unwrap_or(self.inner.config.trace_values),
        };

        self.execute_pipeline(pipeline, context, frame, PositionPath::root())
            .await
    }

    /// Returns true if every invocation in the tree is a registered pure
    /// brick, so running it has no side effects.
    #[must_use]
    pub fn is_previewable(&self, pipeline: &Pipeline) -> bool {
        pipeline.all_invocations().into_iter().all(|invocation| {
            self.inner
                .registry
                .lookup(&invocation.id)
                .map(|brick| brick.is_pure())
                .unwrap_or(false)
        })
    }

    /// Waits for every detached run, including runs spawned while waiting.
    pub async fn join_detached(&self) {
        loop {
            let handles = self.inner.detached.take_handles();
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    tracing::error!(error = %err, "Detached run task panicked");
                }
            }
        }
    }

    /// Builds the options bundle for invoking `brick` outside of a pipeline.
    ///
    /// Used to unit-test bricks directly.
    #[must_use]
    pub fn options_for(&self, brick: &dyn Brick, identity: RunIdentity) -> BrickOptions {
        let frame = RunFrame {
            identity,
            abort: Arc::new(CancellationToken::new()),
            root: ElementRef::document(),
            depth: 0,
            branches: Vec::new(),
            preview: false,
            trace_values: self.inner.config.trace_values,
        };
        self.brick_options(brick, &InstanceId::generate(), frame)
    }

    fn brick_options(
        &self,
        brick: &dyn Brick,
        instance_id: &InstanceId,
        frame: RunFrame,
    ) -> BrickOptions {
        let logger = BrickLogger::new(LoggerContext::new(&frame.identity, brick.id(), instance_id));
        BrickOptions {
            root: frame.root.clone(),
            logger,
            abort_signal: frame.abort.clone(),
            platform: self.inner.platform.clone(),
            state: self.inner.state.clone(),
            identity: frame.identity.clone(),
            brick_id: brick.id().to_string(),
            instance_id: instance_id.clone(),
            runner: SubPipelineRunner::new(self.clone(), frame, brick.is_control_flow()),
        }
    }

    /// Executes a (possibly nested) pipeline and returns its result.
    pub(crate) fn execute_pipeline<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        context: BrickContext,
        frame: RunFrame,
        position: PositionPath,
    ) -> BoxFuture<'a, Result<Value, BrickflowError>> {
        async move {
            let max_depth = self.inner.config.max_depth;
            if frame.depth > max_depth {
                return Err(BrickflowError::Internal(format!(
                    "Maximum pipeline depth of {max_depth} exceeded at position {position}"
                )));
            }

            let mod_namespace = StateNamespace::for_mod(&frame.identity);
            let mut context = context;
            let mut result = context.input().cloned().unwrap_or(Value::Null);

            for (index, invocation) in pipeline.invocations().iter().enumerate() {
                if frame.abort.is_cancelled() {
                    let reason = frame
                        .abort
                        .reason()
                        .unwrap_or_else(|| "aborted".to_string());
                    return Err(BrickflowError::from(CancelError::new(reason))
                        .attributed(&invocation.id, &invocation.instance_id));
                }

                context = context.with_entry(MOD_KEY, self.inner.state.get(&mod_namespace));
                let step = self
                    .run_invocation(invocation, &context, &frame, position.child_index(index))
                    .await?;

                if let Step::Completed { value, kind } = step {
                    match (&invocation.output_key, kind) {
                        (Some(key), BrickKind::Effect) => {
                            context = context.with_binding(key, value);
                        }
                        (Some(key), _) => {
                            context = context.with_binding(key, value.clone());
                            result = value;
                        }
                        (None, BrickKind::Effect) => {}
                        (None, _) => {
                            context = context.with_input(value.clone());
                            result = value;
                        }
                    }
                }
            }

            Ok(result)
        }
        .boxed()
    }

    async fn run_invocation(
        &self,
        invocation: &BrickInvocation,
        context: &BrickContext,
        frame: &RunFrame,
        position: PositionPath,
    ) -> Result<Step, BrickflowError> {
        let instance_id = &invocation.instance_id;
        let entry = |rendered_args: Value| TraceEntry {
            run_id: frame.identity.run_id,
            root_run_id: frame.identity.root_run_id,
            owner: frame.identity.owner(),
            instance_id: instance_id.clone(),
            brick_id: invocation.id.clone(),
            position: position.clone(),
            branches: frame.branches.clone(),
            rendered_args,
            config_hash: invocation.fingerprint(),
            started_at: now_utc(),
        };

        if let Some(condition) = &invocation.condition {
            let value = resolve_optional(condition, context)
                .map_err(|err: TemplateError| err.with_field("if"));
            match value {
                Ok(value) if is_truthy(value.as_ref()) => {}
                Ok(_) => {
                    tracing::debug!(
                        run_id = %frame.identity.run_id,
                        brick_id = %invocation.id,
                        instance_id = %instance_id,
                        "Brick skipped: condition is false"
                    );
                    self.inner.recorder.record_skip(entry(Value::Null), "condition");
                    return Ok(Step::Skipped);
                }
                Err(err) => return Err(self.record_failure(entry(Value::Null), err.into())),
            }
        }

        let brick = match self.inner.registry.lookup(&invocation.id) {
            Ok(brick) => brick,
            Err(err) => return Err(self.record_failure(entry(Value::Null), err.into())),
        };

        if frame.preview && !brick.is_pure() {
            tracing::debug!(
                run_id = %frame.identity.run_id,
                brick_id = %invocation.id,
                instance_id = %instance_id,
                "Brick skipped: impure brick in preview"
            );
            self.inner.recorder.record_skip(entry(Value::Null), "preview");
            return Ok(Step::Skipped);
        }

        let args = match render_args(&invocation.config, context, &position) {
            Ok(args) => args,
            Err(err) => return Err(self.record_failure(entry(Value::Null), err.into())),
        };
        let rendered = if frame.trace_values {
            args.to_value()
        } else {
            Value::Null
        };

        let mut brick_frame = frame.clone();
        if brick.is_root_aware() && !invocation.root_mode.is_inherit() {
            match self
                .inner
                .root_resolver
                .resolve(invocation.root_mode, invocation.root.as_deref(), &frame.root)
                .await
            {
                Ok(root) => brick_frame.root = root,
                Err(err) => return Err(self.record_failure(entry(rendered), err)),
            }
        }

        if let Err(err) = self.check_capabilities(brick.as_ref()) {
            return Err(self.record_failure(entry(rendered), err));
        }

        let entry = entry(rendered);
        let key = entry.key();
        self.inner.recorder.record_enter(entry);

        let options = self.brick_options(brick.as_ref(), instance_id, brick_frame);
        let span = options.logger.span().clone();
        match brick.run(args, &options).instrument(span).await {
            Ok(value) => {
                let output = if frame.trace_values {
                    value.clone()
                } else {
                    Value::Null
                };
                self.inner.recorder.record_exit(&key, output);
                Ok(Step::Completed {
                    value,
                    kind: brick.kind(),
                })
            }
            Err(err) => {
                let err = err.attributed(brick.id(), instance_id);
                if err.instance_id() == Some(instance_id) {
                    options.logger.warn(&format!("Brick failed: {err}"));
                }
                self.inner.recorder.record_error(&key, err.to_serialized());
                Err(err)
            }
        }
    }

    /// Records an invocation that failed before its brick ran.
    fn record_failure(&self, entry: TraceEntry, err: BrickflowError) -> BrickflowError {
        let err = err.attributed(&entry.brick_id, &entry.instance_id);
        tracing::warn!(
            run_id = %entry.run_id,
            brick_id = %entry.brick_id,
            instance_id = %entry.instance_id,
            position = %entry.position,
            error = %err,
            "Brick invocation failed"
        );
        let key = entry.key();
        self.inner.recorder.record_enter(entry);
        self.inner.recorder.record_error(&key, err.to_serialized());
        err
    }

    fn check_capabilities(&self, brick: &dyn Brick) -> Result<(), BrickflowError> {
        if !self.inner.config.enforce_capabilities {
            return Ok(());
        }
        let available = self.inner.platform.capabilities();
        let missing: Vec<String> = brick
            .required_capabilities()
            .into_iter()
            .filter(|capability| !available.contains(capability))
            .map(|capability| capability.to_string())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(BrickExecutionError::new(format!(
            "Platform '{}' lacks capabilities required by '{}': {}",
            self.inner.platform.platform_name(),
            brick.id(),
            missing.join(", ")
        ))
        .into())
    }

    /// Starts a nested pipeline as an independent run.
    pub(crate) fn spawn_detached(
        &self,
        thunk: &PipelineThunk,
        extra: Map<String, Value>,
        parent: &RunFrame,
        on_complete: Option<CompletionHook>,
    ) -> Uuid {
        let identity = parent.identity.child();
        let run_id = identity.run_id;
        let abort = match self.inner.config.detached_abort {
            DetachedAbortPolicy::Independent => Arc::new(CancellationToken::new()),
            DetachedAbortPolicy::Inherit => parent.abort.child_token(),
        };
        let frame = RunFrame {
            identity: identity.clone(),
            abort,
            root: parent.root.clone(),
            depth: parent.depth + 1,
            branches: Vec::new(),
            preview: parent.preview,
            trace_values: parent.trace_values,
        };
        let context = thunk
            .context()
            .merged(&extra)
            .with_entry(RUN_KEY, identity.to_context_value());

        self.inner.detached.register(DetachedRunInfo {
            run_id,
            parent_run_id: parent.identity.run_id,
            owner: identity.owner(),
            depth: frame.depth,
            spawned_at: iso_timestamp(),
        });

        let executor = self.clone();
        let pipeline = thunk.pipeline().clone();
        let position = thunk.position().clone();
        let span = tracing::info_span!(
            "detached_run",
            run_id = %run_id,
            parent_run_id = %parent.identity.run_id
        );
        let handle = tokio::spawn(
            async move {
                let start = Instant::now();
                let result = executor
                    .execute_pipeline(&pipeline, context, frame, position)
                    .await;
                let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                match &result {
                    Ok(_) => tracing::info!(duration_ms, "Detached run completed"),
                    Err(err) => tracing::warn!(duration_ms, error = %err, "Detached run failed"),
                }
                executor.inner.detached.unregister(run_id);
                if let Some(on_complete) = on_complete {
                    on_complete(result);
                }
            }
            .instrument(span),
        );
        self.inner.detached.push_handle(handle);
        run_id
    }
}

impl fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .field("detached", &self.inner.detached.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bricks::{ids, FnBrick};
    use crate::context::{MockPlatformServices, PlatformCapability, RootMode};
    use crate::expression::ConfigValue;
    use crate::trace::TraceOutcome;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn executor_with(bricks: Vec<FnBrick>) -> PipelineExecutor {
        let registry = BrickRegistry::with_builtins();
        for brick in bricks {
            registry.register(Arc::new(brick));
        }
        PipelineExecutor::new(Arc::new(registry))
    }

    fn upper_brick() -> FnBrick {
        FnBrick::new("test/upper", BrickKind::Transform, |args| async move {
            let text = args.require_str("text")?.to_uppercase();
            Ok(Value::String(text))
        })
    }

    #[tokio::test]
    async fn test_output_threads_into_next_invocation() {
        let executor = executor_with(vec![upper_brick()]);
        let pipeline = Pipeline::new(vec![
            BrickInvocation::new(ids::ECHO).with_config("message", "hello"),
            BrickInvocation::new("test/upper").with_config("text", ConfigValue::var("@input")),
        ]);

        let output = executor.run(&pipeline, Value::Null, RunOptions::new()).await.unwrap();
        assert_eq!(output, json!("HELLO"));
    }

    #[tokio::test]
    async fn test_output_key_binds_value() {
        let executor = executor_with(vec![upper_brick()]);
        let pipeline = Pipeline::new(vec![
            BrickInvocation::new(ids::ECHO)
                .with_config("message", "first")
                .with_output_key("greeting"),
            BrickInvocation::new(ids::ECHO).with_config("message", "second"),
            BrickInvocation::new("test/upper").with_config("text", ConfigValue::var("@greeting")),
        ]);

        let output = executor.run(&pipeline, Value::Null, RunOptions::new()).await.unwrap();
        assert_eq!(output, json!("FIRST"));
    }

    #[tokio::test]
    async fn test_false_condition_skips() {
        let executor = executor_with(vec![]);
        let skipped = BrickInvocation::new(ids::ECHO)
            .with_config("message", "never")
            .with_condition(ConfigValue::var("@enabled"));
        let skipped_id = skipped.instance_id.clone();
        let pipeline = Pipeline::new(vec![
            BrickInvocation::new(ids::ECHO).with_config("message", "kept"),
            skipped,
        ]);

        let result = executor
            .run_detailed(&pipeline, json!({"enabled": false}), RunOptions::new())
            .await;
        assert_eq!(result.output(), Some(&json!("kept")));

        let records = executor.recorder().latest_run(&skipped_id);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].outcome,
            TraceOutcome::Skipped {
                reason: "condition".into()
            }
        );
        assert_eq!(records[0].run_id, result.run_id);
    }

    #[tokio::test]
    async fn test_condition_error_names_if_field() {
        let executor = executor_with(vec![]);
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::ECHO)
            .with_config("message", "x")
            .with_condition(ConfigValue::template("{{ @a | nope }}"))]);

        let err = executor.run(&pipeline, Value::Null, RunOptions::new()).await.unwrap_err();
        match err {
            BrickflowError::Template(err) => assert_eq!(err.field.as_deref(), Some("if")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_brick_is_recorded() {
        let executor = executor_with(vec![]);
        let invocation = BrickInvocation::new("test/missing");
        let instance_id = invocation.instance_id.clone();
        let pipeline = Pipeline::new(vec![invocation]);

        let err = executor.run(&pipeline, Value::Null, RunOptions::new()).await.unwrap_err();
        assert!(matches!(err, BrickflowError::BrickNotFound(_)));
        assert_eq!(err.instance_id(), Some(&instance_id));

        let records = executor.recorder().latest_run(&instance_id);
        assert_eq!(records.len(), 1);
        assert!(records[0].is_failed());
    }

    #[tokio::test]
    async fn test_effect_output_is_not_threaded() {
        let effect = FnBrick::new("test/effect", BrickKind::Effect, |_args| async move {
            Ok(json!("side effect"))
        });
        let executor = executor_with(vec![effect]);
        let pipeline = Pipeline::new(vec![
            BrickInvocation::new(ids::ECHO).with_config("message", "kept"),
            BrickInvocation::new("test/effect"),
        ]);

        let output = executor.run(&pipeline, Value::Null, RunOptions::new()).await.unwrap();
        assert_eq!(output, json!("kept"));
    }

    #[tokio::test]
    async fn test_preview_skips_impure_bricks() {
        let effect = FnBrick::new("test/effect", BrickKind::Effect, |_args| async move {
            Err(BrickExecutionError::new("must not run").into())
        });
        let executor = executor_with(vec![effect]);
        let pipeline = Pipeline::new(vec![
            BrickInvocation::new(ids::ECHO).with_config("message", "kept"),
            BrickInvocation::new("test/effect"),
        ]);

        assert!(!executor.is_previewable(&pipeline));
        let output = executor
            .run(&pipeline, Value::Null, RunOptions::new().preview())
            .await
            .unwrap();
        assert_eq!(output, json!("kept"));
    }

    #[tokio::test]
    async fn test_root_resolution_for_root_aware_bricks() {
        let reader = FnBrick::new("test/root", BrickKind::Reader, |_args| async move {
            Ok(Value::Null)
        })
        .root_aware();
        let registry = Arc::new(BrickRegistry::new());
        registry.register(Arc::new(reader));
        let executor = PipelineExecutor::new(registry);

        let pipeline = Pipeline::new(vec![
            BrickInvocation::new("test/root").with_root(RootMode::Element, None)
        ]);
        let err = executor.run(&pipeline, Value::Null, RunOptions::new()).await.unwrap_err();
        assert_eq!(err.to_serialized().property.as_deref(), Some("root"));
    }

    #[tokio::test]
    async fn test_missing_capability_fails() {
        let http = FnBrick::new("test/http", BrickKind::Reader, |_args| async move {
            Ok(Value::Null)
        })
        .with_capability(PlatformCapability::Http);
        let registry = Arc::new(BrickRegistry::new());
        registry.register(Arc::new(http));

        let mut platform = MockPlatformServices::new();
        platform
            .expect_capabilities()
            .returning(|| vec![PlatformCapability::Dom]);
        platform
            .expect_platform_name()
            .returning(|| "content-script".to_string());

        let executor = PipelineExecutor::builder(registry)
            .with_platform(Arc::new(platform))
            .build();
        let pipeline = Pipeline::new(vec![BrickInvocation::new("test/http")]);

        let err = executor.run(&pipeline, Value::Null, RunOptions::new()).await.unwrap_err();
        assert!(err.is_catchable());
        assert!(err.to_string().contains("http"));
    }

    #[tokio::test]
    async fn test_duplicate_instance_ids_rejected() {
        let executor = executor_with(vec![]);
        let pipeline = Pipeline::new(vec![
            BrickInvocation::new(ids::ECHO).with_instance_id("same"),
            BrickInvocation::new(ids::ECHO).with_instance_id("same"),
        ]);

        let err = executor.run(&pipeline, Value::Null, RunOptions::new()).await.unwrap_err();
        assert!(matches!(err, BrickflowError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_next_invocation() {
        let executor = executor_with(vec![]);
        let token = Arc::new(CancellationToken::new());
        token.cancel("user navigated away");
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::ECHO).with_config("message", "x")]);

        let err = executor
            .run(&pipeline, Value::Null, RunOptions::new().with_abort_signal(token))
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        assert!(err.to_string().contains("user navigated away"));
    }

    #[tokio::test]
    async fn test_run_metadata_in_context() {
        let executor = executor_with(vec![]);
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::IDENTITY)
            .with_config("mod", ConfigValue::var("@run.modId"))
            .with_config("theme", ConfigValue::var("@options.theme"))]);

        let output = executor
            .run(
                &pipeline,
                Value::Null,
                RunOptions::new()
                    .with_mod_id("mod-1")
                    .with_mod_options(json!({"theme": "dark"})),
            )
            .await
            .unwrap();
        assert_eq!(output, json!({"mod": "mod-1", "theme": "dark"}));
    }

    #[tokio::test]
    async fn test_trace_values_disabled() {
        let executor = executor_with(vec![]);
        let invocation = BrickInvocation::new(ids::ECHO).with_config("message", "secret");
        let instance_id = invocation.instance_id.clone();
        let pipeline = Pipeline::new(vec![invocation]);

        executor
            .run(&pipeline, Value::Null, RunOptions::new().with_trace_values(false))
            .await
            .unwrap();
        let records = executor.recorder().latest_run(&instance_id);
        assert_eq!(records[0].rendered_args, Value::Null);
        assert_eq!(
            records[0].outcome,
            TraceOutcome::Succeeded {
                output: Value::Null
            }
        );
    }
}
