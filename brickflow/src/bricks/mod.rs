//! Bricks: the units of work a pipeline invokes.
//!
//! The executor only ever calls a brick through the [`Brick`] trait. The
//! built-in catalog covers control flow, mod state and a few utilities; host
//! applications register their own bricks next to them.

mod args;
mod control_flow;
mod registry;
mod retry;
mod state;
mod utility;

pub use args::BrickArgs;
pub use control_flow::{ForEachBrick, IfElseBrick, RetryBrick, RunBrick, TryExceptBrick};
pub use registry::BrickRegistry;
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use state::{AssignModVariableBrick, GetStateBrick, SetStateBrick, StateScope, WithAsyncModVariableBrick};
pub use utility::{EchoBrick, ErrorBrick, IdentityBrick, WaitBrick};

use crate::context::PlatformCapability;
use crate::errors::BrickflowError;
use crate::pipeline::BrickOptions;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

/// Built-in brick identifiers.
pub mod ids {
    /// Conditional branch.
    pub const IF_ELSE: &str = "@brickflow/if-else";
    /// Try/except.
    pub const TRY_EXCEPT: &str = "@brickflow/try-except";
    /// Sub-pipeline runner.
    pub const RUN: &str = "@brickflow/run";
    /// Each-element loop.
    pub const FOR_EACH: &str = "@brickflow/for-each";
    /// Retry loop.
    pub const RETRY: &str = "@brickflow/retry";
    /// Assign a mod variable.
    pub const ASSIGN: &str = "@brickflow/state/assign";
    /// Read state.
    pub const GET_STATE: &str = "@brickflow/state/get";
    /// Write state.
    pub const SET_STATE: &str = "@brickflow/state/set";
    /// Run a pipeline in the background, tracking it in a mod variable.
    pub const WITH_ASYNC: &str = "@brickflow/state/with-async";
    /// Echo a message.
    pub const ECHO: &str = "@brickflow/echo";
    /// Return the arguments.
    pub const IDENTITY: &str = "@brickflow/identity";
    /// Raise an error.
    pub const ERROR: &str = "@brickflow/error";
    /// Sleep.
    pub const WAIT: &str = "@brickflow/wait";
}

/// The role a brick plays in a mod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrickKind {
    /// Reads data from the page or elsewhere.
    Reader,
    /// Computes a value from its arguments.
    Transform,
    /// Performs a side effect; its output is not threaded forward.
    Effect,
    /// Renders content for display.
    Renderer,
}

impl fmt::Display for BrickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reader => "reader",
            Self::Transform => "transform",
            Self::Effect => "effect",
            Self::Renderer => "renderer",
        };
        f.write_str(name)
    }
}

/// The capability flags the registry reports for a brick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrickCapabilities {
    /// The brick kind.
    pub kind: BrickKind,
    /// Whether the brick is free of side effects.
    pub is_pure: bool,
    /// Whether the brick's behavior is scoped to a root element.
    pub is_root_aware: bool,
    /// Platform capabilities the brick needs.
    pub required_capabilities: Vec<PlatformCapability>,
    /// Whether the brick may execute nested pipelines.
    pub is_control_flow: bool,
}

/// Trait for brick implementations.
#[async_trait]
pub trait Brick: Send + Sync + Debug {
    /// Returns the registry identifier.
    fn id(&self) -> &str;

    /// Returns the brick kind.
    fn kind(&self) -> BrickKind;

    /// Returns a short description.
    fn description(&self) -> &str {
        ""
    }

    /// Returns the JSON-Schema-shaped input schema.
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    /// Returns true if running the brick has no side effects.
    ///
    /// Preview runs skip impure bricks.
    fn is_pure(&self) -> bool {
        !matches!(self.kind(), BrickKind::Effect)
    }

    /// Returns true if the brick operates on a root element.
    fn is_root_aware(&self) -> bool {
        false
    }

    /// Returns the platform capabilities the brick needs.
    fn required_capabilities(&self) -> Vec<PlatformCapability> {
        Vec::new()
    }

    /// Returns true if the brick may execute the nested pipelines it receives.
    fn is_control_flow(&self) -> bool {
        false
    }

    /// Runs the brick.
    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError>;
}

/// Handler type for [`FnBrick`].
pub type BrickHandler =
    Arc<dyn Fn(BrickArgs) -> BoxFuture<'static, Result<Value, BrickflowError>> + Send + Sync>;

/// A brick backed by an async closure.
#[derive(Clone)]
pub struct FnBrick {
    id: String,
    kind: BrickKind,
    pure: Option<bool>,
    root_aware: bool,
    capabilities: Vec<PlatformCapability>,
    schema: Value,
    handler: BrickHandler,
}

impl FnBrick {
    /// Creates a brick from an async closure.
    pub fn new<F, Fut>(id: impl Into<String>, kind: BrickKind, handler: F) -> Self
    where
        F: Fn(BrickArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BrickflowError>> + Send + 'static,
    {
        Self {
            id: id.into(),
            kind,
            pure: None,
            root_aware: false,
            capabilities: Vec::new(),
            schema: serde_json::json!({"type": "object", "properties": {}}),
            handler: Arc::new(move |args| handler(args).boxed()),
        }
    }

    /// Overrides the purity derived from the kind.
    #[must_use]
    pub fn with_pure(mut self, pure: bool) -> Self {
        self.pure = Some(pure);
        self
    }

    /// Marks the brick as root-aware.
    #[must_use]
    pub fn root_aware(mut self) -> Self {
        self.root_aware = true;
        self
    }

    /// Adds a required platform capability.
    #[must_use]
    pub fn with_capability(mut self, capability: PlatformCapability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

impl Debug for FnBrick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBrick")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Brick for FnBrick {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BrickKind {
        self.kind
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    fn is_pure(&self) -> bool {
        self.pure.unwrap_or(!matches!(self.kind, BrickKind::Effect))
    }

    fn is_root_aware(&self) -> bool {
        self.root_aware
    }

    fn required_capabilities(&self) -> Vec<PlatformCapability> {
        self.capabilities.clone()
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions) -> Result<Value, BrickflowError> {
        (self.handler)(args).await
    }
}

/// Builds an object input schema with required properties.
pub(crate) fn required_schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
