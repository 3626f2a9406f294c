//! Small general-purpose bricks.

use super::{ids, required_schema, Brick, BrickArgs, BrickKind};
use crate::errors::{BrickExecutionError, BrickflowError, CancelError};
use crate::pipeline::BrickOptions;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Returns its `message` argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBrick;

#[async_trait]
impl Brick for EchoBrick {
    fn id(&self) -> &str {
        ids::ECHO
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn description(&self) -> &str {
        "Return a message"
    }

    fn input_schema(&self) -> Value {
        required_schema(json!({"message": {"type": "string"}}), &["message"])
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions) -> Result<Value, BrickflowError> {
        Ok(args.get("message").cloned().unwrap_or(Value::Null))
    }
}

/// Returns its rendered arguments as an object.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityBrick;

#[async_trait]
impl Brick for IdentityBrick {
    fn id(&self) -> &str {
        ids::IDENTITY
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn description(&self) -> &str {
        "Return the arguments unchanged"
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions) -> Result<Value, BrickflowError> {
        Ok(args.to_value())
    }
}

/// Fails with its `message` argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorBrick;

#[async_trait]
impl Brick for ErrorBrick {
    fn id(&self) -> &str {
        ids::ERROR
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn description(&self) -> &str {
        "Raise an error"
    }

    fn input_schema(&self) -> Value {
        required_schema(json!({"message": {"type": "string"}}), &[])
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions) -> Result<Value, BrickflowError> {
        let message = args.get_str("message").unwrap_or("Error raised by pipeline");
        Err(BrickExecutionError::new(message).into())
    }
}

/// Sleeps for `millis` milliseconds, failing early if the run is aborted.
///
/// The output is discarded, so the previous value flows past the wait.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitBrick;

#[async_trait]
impl Brick for WaitBrick {
    fn id(&self) -> &str {
        ids::WAIT
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn is_pure(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        "Wait before continuing"
    }

    fn input_schema(&self) -> Value {
        required_schema(json!({"millis": {"type": "integer", "minimum": 0}}), &["millis"])
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        let millis = args.get_u64("millis", 0)?;
        options.check_abort()?;

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(millis)) => Ok(Value::Null),
            () = options.abort_signal.cancelled() => {
                let reason = options
                    .abort_signal
                    .reason()
                    .unwrap_or_else(|| "aborted".to_string());
                Err(CancelError::new(reason).into())
            }
        }
    }
}
