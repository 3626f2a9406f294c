//! Mock bricks for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;

use crate::bricks::{Brick, BrickArgs, BrickKind};
use crate::errors::{BrickExecutionError, BrickflowError, CancelError, PropError};
use crate::pipeline::BrickOptions;

/// A brick that counts calls and returns a configurable output.
#[derive(Debug)]
pub struct MockBrick {
    id: String,
    kind: BrickKind,
    output: Mutex<Value>,
    call_count: Mutex<usize>,
}

impl MockBrick {
    /// Creates a transform brick returning `null`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: BrickKind::Transform,
            output: Mutex::new(Value::Null),
            call_count: Mutex::new(0),
        }
    }

    /// Sets the brick kind.
    #[must_use]
    pub fn with_kind(mut self, kind: BrickKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the output to return.
    #[must_use]
    pub fn returning(self, output: Value) -> Self {
        self.set_output(output);
        self
    }

    /// Replaces the output to return.
    pub fn set_output(&self, output: Value) {
        *self.output.lock() = output;
    }

    /// Returns the number of times the brick was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        *self.call_count.lock() = 0;
    }
}

#[async_trait]
impl Brick for MockBrick {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BrickKind {
        self.kind
    }

    async fn run(&self, _args: BrickArgs, _options: &BrickOptions) -> Result<Value, BrickflowError> {
        *self.call_count.lock() += 1;
        Ok(self.output.lock().clone())
    }
}

/// A brick that always fails.
#[derive(Debug)]
pub struct FailingBrick {
    id: String,
    message: String,
    property: Option<String>,
    failures_left: Mutex<Option<usize>>,
}

impl FailingBrick {
    /// Creates a brick failing with a `BrickExecutionError`.
    #[must_use]
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            property: None,
            failures_left: Mutex::new(None),
        }
    }

    /// Fails with a `PropError` naming `property` instead.
    #[must_use]
    pub fn on_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Fails only the first `times` calls, then returns `"ok"`.
    #[must_use]
    pub fn times(self, times: usize) -> Self {
        *self.failures_left.lock() = Some(times);
        self
    }
}

#[async_trait]
impl Brick for FailingBrick {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    async fn run(&self, _args: BrickArgs, _options: &BrickOptions) -> Result<Value, BrickflowError> {
        {
            let mut left = self.failures_left.lock();
            match left.as_mut() {
                Some(0) => return Ok(Value::String("ok".into())),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        match &self.property {
            Some(property) => Err(PropError::new(property.clone(), self.message.clone()).into()),
            None => Err(BrickExecutionError::new(self.message.clone()).into()),
        }
    }
}

/// A brick that waits before returning its `value` argument.
#[derive(Debug)]
pub struct SlowBrick {
    id: String,
    delay: Duration,
}

impl SlowBrick {
    /// Creates a slow brick.
    #[must_use]
    pub fn new(id: impl Into<String>, delay: Duration) -> Self {
        Self {
            id: id.into(),
            delay,
        }
    }

    /// Creates a slow brick with a delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(id: impl Into<String>, ms: u64) -> Self {
        Self::new(id, Duration::from_millis(ms))
    }
}

#[async_trait]
impl Brick for SlowBrick {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        tokio::select! {
            () = tokio::time::sleep(self.delay) => {
                Ok(args.get("value").cloned().unwrap_or(Value::Null))
            }
            () = options.abort_signal.cancelled() => {
                let reason = options.abort_signal.reason().unwrap_or_default();
                Err(CancelError::new(reason).into())
            }
        }
    }
}

/// A brick that records the arguments of every call and returns them.
#[derive(Debug)]
pub struct RecordingBrick {
    id: String,
    kind: BrickKind,
    calls: Mutex<Vec<Value>>,
}

impl RecordingBrick {
    /// Creates a transform recording brick.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: BrickKind::Transform,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates an effect recording brick.
    #[must_use]
    pub fn effect(id: impl Into<String>) -> Self {
        Self {
            kind: BrickKind::Effect,
            ..Self::new(id)
        }
    }

    /// Returns the rendered arguments of each call.
    #[must_use]
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Clears recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl Brick for RecordingBrick {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BrickKind {
        self.kind
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions) -> Result<Value, BrickflowError> {
        let value = args.to_value();
        self.calls.lock().push(value.clone());
        Ok(value)
    }
}
