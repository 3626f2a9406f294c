//! Options for runs and for individual brick invocations.

use super::executor::{PipelineExecutor, RunFrame};
use super::{BranchFrame, InstanceId, PipelineThunk};
use crate::cancellation::CancellationToken;
use crate::context::{ElementRef, PlatformServices, RunIdentity};
use crate::errors::{BrickExecutionError, BrickflowError, CancelError};
use crate::observability::BrickLogger;
use crate::state::{ModVariableStore, StateNamespace};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Callback invoked with the result of a detached run.
pub type CompletionHook = Box<dyn FnOnce(Result<Value, BrickflowError>) + Send + 'static>;

/// Options for a top-level run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// The run ID; generated when absent.
    pub run_id: Option<Uuid>,
    /// The mod the run belongs to.
    pub mod_id: Option<String>,
    /// The mod component that started the run.
    pub component_id: Option<String>,
    /// The mod options exposed as `@options`.
    pub mod_options: Option<Value>,
    /// The ambient root element.
    pub root: ElementRef,
    /// The abort signal; a fresh token is used when absent.
    pub abort_signal: Option<Arc<CancellationToken>>,
    /// Whether impure bricks are skipped.
    pub preview: bool,
    /// Overrides the executor's `trace_values` setting.
    pub trace_values: Option<bool>,
}

impl RunOptions {
    /// Creates default run options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run ID.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
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

    /// Sets the mod options.
    #[must_use]
    pub fn with_mod_options(mut self, mod_options: Value) -> Self {
        self.mod_options = Some(mod_options);
        self
    }

    /// Sets the ambient root.
    #[must_use]
    pub fn with_root(mut self, root: ElementRef) -> Self {
        self.root = root;
        self
    }

    /// Sets the abort signal.
    #[must_use]
    pub fn with_abort_signal(mut self, abort_signal: Arc<CancellationToken>) -> Self {
        self.abort_signal = Some(abort_signal);
        self
    }

    /// Enables preview mode.
    #[must_use]
    pub fn preview(mut self) -> Self {
        self.preview = true;
        self
    }

    /// Overrides value tracing.
    #[must_use]
    pub fn with_trace_values(mut self, trace_values: bool) -> Self {
        self.trace_values = Some(trace_values);
        self
    }
}

/// Re-enters the executor on behalf of a control-flow brick.
#[derive(Clone)]
pub(crate) struct SubPipelineRunner {
    executor: PipelineExecutor,
    frame: RunFrame,
    permitted: bool,
}

impl SubPipelineRunner {
    pub(crate) fn new(executor: PipelineExecutor, frame: RunFrame, permitted: bool) -> Self {
        Self {
            executor,
            frame,
            permitted,
        }
    }
}

/// The options bundle passed to every brick invocation.
pub struct BrickOptions {
    /// The resolved root element.
    pub root: ElementRef,
    /// A logger bound to the run and invocation.
    pub logger: BrickLogger,
    /// The run's abort signal.
    pub abort_signal: Arc<CancellationToken>,
    /// The platform services.
    pub platform: Arc<dyn PlatformServices>,
    /// The mod variable store.
    pub state: Arc<ModVariableStore>,
    /// The run identity.
    pub identity: RunIdentity,
    /// The brick being invoked.
    pub brick_id: String,
    /// The invocation.
    pub instance_id: InstanceId,
    pub(crate) runner: SubPipelineRunner,
}

impl BrickOptions {
    /// Returns a cancel error if the abort signal has fired.
    pub fn check_abort(&self) -> Result<(), CancelError> {
        if self.abort_signal.is_cancelled() {
            let reason = self.abort_signal.reason().unwrap_or_else(|| "aborted".to_string());
            return Err(CancelError::new(reason));
        }
        Ok(())
    }

    /// Returns the mod namespace of the current run.
    #[must_use]
    pub fn mod_namespace(&self) -> StateNamespace {
        StateNamespace::for_mod(&self.identity)
    }

    fn ensure_permitted(&self) -> Result<(), BrickflowError> {
        if self.runner.permitted {
            return Ok(());
        }
        Err(BrickExecutionError::new(format!(
            "Brick '{}' is not permitted to run nested pipelines",
            self.brick_id
        ))
        .into())
    }

    /// Runs a nested pipeline and awaits its result.
    ///
    /// `extra` entries are layered on top of the thunk's captured context.
    pub async fn run_pipeline(
        &self,
        thunk: &PipelineThunk,
        extra: Map<String, Value>,
    ) -> Result<Value, BrickflowError> {
        self.run_nested(thunk, None, extra).await
    }

    /// Runs one iteration or attempt of a nested pipeline.
    ///
    /// The branch frame keeps trace records of repeated runs apart.
    pub async fn run_branch(
        &self,
        thunk: &PipelineThunk,
        branch: BranchFrame,
        extra: Map<String, Value>,
    ) -> Result<Value, BrickflowError> {
        self.run_nested(thunk, Some(branch), extra).await
    }

    async fn run_nested(
        &self,
        thunk: &PipelineThunk,
        branch: Option<BranchFrame>,
        extra: Map<String, Value>,
    ) -> Result<Value, BrickflowError> {
        self.ensure_permitted()?;
        let frame = self.runner.frame.nested(branch);
        let context = thunk.context().merged(&extra);
        self.runner
            .executor
            .execute_pipeline(thunk.pipeline(), context, frame, thunk.position().clone())
            .await
    }

    /// Starts a nested pipeline without awaiting it.
    ///
    /// Returns the detached run's ID.
    pub fn spawn_pipeline(
        &self,
        thunk: &PipelineThunk,
        extra: Map<String, Value>,
    ) -> Result<Uuid, BrickflowError> {
        self.ensure_permitted()?;
        Ok(self.runner.executor.spawn_detached(thunk, extra, &self.runner.frame, None))
    }

    /// Starts a nested pipeline without awaiting it, calling `on_complete`
    /// with its result.
    pub fn spawn_pipeline_with<F>(
        &self,
        thunk: &PipelineThunk,
        extra: Map<String, Value>,
        on_complete: F,
    ) -> Result<Uuid, BrickflowError>
    where
        F: FnOnce(Result<Value, BrickflowError>) + Send + 'static,
    {
        self.ensure_permitted()?;
        Ok(self.runner.executor.spawn_detached(
            thunk,
            extra,
            &self.runner.frame,
            Some(Box::new(on_complete)),
        ))
    }
}

impl fmt::Debug for BrickOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrickOptions")
            .field("root", &self.root)
            .field("identity", &self.identity)
            .field("brick_id", &self.brick_id)
            .field("instance_id", &self.instance_id)
            .field("platform", &self.platform.platform_name())
            .field("control_flow", &self.runner.permitted)
            .finish_non_exhaustive()
    }
}
