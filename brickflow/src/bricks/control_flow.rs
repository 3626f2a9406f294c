//! Control-flow bricks.
//!
//! These are the only bricks allowed to execute the nested pipelines they
//! receive as thunks.

use super::{ids, required_schema, Brick, BrickArgs, BrickKind, RetryPolicy};
use crate::context::ERROR_KEY;
use crate::errors::{BrickflowError, CancelError, PropError};
use crate::pipeline::{BranchFrame, BrickOptions};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Runs the `if` pipeline when `condition` is truthy, otherwise `else`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IfElseBrick;

#[async_trait]
impl Brick for IfElseBrick {
    fn id(&self) -> &str {
        ids::IF_ELSE
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn description(&self) -> &str {
        "Run one of two pipelines depending on a condition"
    }

    fn input_schema(&self) -> Value {
        required_schema(
            json!({
                "condition": {"description": "The condition to evaluate"},
                "if": {"description": "Pipeline run when the condition is true"},
                "else": {"description": "Pipeline run when the condition is false"},
            }),
            &["condition"],
        )
    }

    fn is_control_flow(&self) -> bool {
        true
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        let branch = if args.flag("condition", false) { "if" } else { "else" };
        match args.pipeline(branch) {
            Some(thunk) => options.run_pipeline(thunk, Map::new()).await,
            None => Ok(Value::Null),
        }
    }
}

/// Runs the `try` pipeline and, when it fails, the `except` pipeline with the
/// caught error bound to `@error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TryExceptBrick;

#[async_trait]
impl Brick for TryExceptBrick {
    fn id(&self) -> &str {
        ids::TRY_EXCEPT
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn description(&self) -> &str {
        "Recover from errors raised by a pipeline"
    }

    fn input_schema(&self) -> Value {
        required_schema(
            json!({
                "try": {"description": "Pipeline to attempt"},
                "except": {"description": "Pipeline run with @error when the attempt fails"},
            }),
            &["try"],
        )
    }

    fn is_control_flow(&self) -> bool {
        true
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        let attempt = args.require_pipeline("try")?;

        let err = match options.run_pipeline(attempt, Map::new()).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_catchable() => err,
            Err(err) => return Err(err),
        };

        options
            .logger
            .debug(&format!("Caught error from try pipeline: {err}"));

        match args.pipeline("except") {
            Some(except) => {
                let mut extra = Map::new();
                extra.insert(ERROR_KEY.to_string(), err.to_serialized().to_value());
                options.run_pipeline(except, extra).await
            }
            None => Ok(Value::Null),
        }
    }
}

/// Runs a nested pipeline, optionally without waiting for it.
///
/// In async mode the brick returns `{}` immediately and the body continues as
/// a detached run with its own run id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunBrick;

#[async_trait]
impl Brick for RunBrick {
    fn id(&self) -> &str {
        ids::RUN
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn description(&self) -> &str {
        "Run a pipeline"
    }

    fn input_schema(&self) -> Value {
        required_schema(
            json!({
                "body": {"description": "The pipeline to run"},
                "async": {"type": "boolean", "default": false},
            }),
            &["body"],
        )
    }

    fn is_control_flow(&self) -> bool {
        true
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        let body = args.require_pipeline("body")?;

        if args.flag("async", false) {
            let run_id = options.spawn_pipeline(body, Map::new())?;
            options.logger.debug(&format!("Started detached run {run_id}"));
            return Ok(Value::Object(Map::new()));
        }

        options.run_pipeline(body, Map::new()).await
    }
}

/// Runs `body` once per element of `elements`.
///
/// Each iteration binds the element to `@<elementKey>` (default
/// `@element`) and runs inside its own branch frame. Returns the last
/// iteration's result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForEachBrick;

#[async_trait]
impl Brick for ForEachBrick {
    fn id(&self) -> &str {
        ids::FOR_EACH
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn description(&self) -> &str {
        "Run a pipeline for each element of an array"
    }

    fn input_schema(&self) -> Value {
        required_schema(
            json!({
                "elements": {"type": "array"},
                "body": {"description": "Pipeline run for each element"},
                "elementKey": {"type": "string", "default": "element"},
            }),
            &["elements", "body"],
        )
    }

    fn is_control_flow(&self) -> bool {
        true
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        let elements = match args.get_present("elements") {
            None => Vec::new(),
            Some(Value::Array(elements)) => elements.clone(),
            Some(other) => {
                return Err(PropError::new(
                    "elements",
                    format!("expected an array, got {other}"),
                )
                .into())
            }
        };
        let body = args.require_pipeline("body")?;
        let element_key = args.get_str("elementKey").unwrap_or("element");
        let binding = format!("@{}", element_key.trim_start_matches('@'));

        let mut last = Value::Null;
        for (index, element) in elements.into_iter().enumerate() {
            options.check_abort()?;
            let mut extra = Map::new();
            extra.insert(binding.clone(), element);
            last = options
                .run_branch(body, BranchFrame::new("body", index), extra)
                .await?;
        }
        Ok(last)
    }
}

/// Re-runs `body` until it succeeds or the retry budget is exhausted.
///
/// Only catchable execution errors are retried. Cancellation is never
/// retried, and the delay between attempts observes the abort signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryBrick;

impl RetryBrick {
    fn policy(args: &BrickArgs) -> Result<RetryPolicy, BrickflowError> {
        let defaults = RetryPolicy::default();
        let max_retries = args.get_u64("maxRetries", u64::from(defaults.max_retries))?;
        let mut policy = defaults
            .with_max_retries(u32::try_from(max_retries).unwrap_or(u32::MAX))
            .with_interval_ms(args.get_u64("intervalMillis", 0)?);
        if let Some(backoff) = args.parse("backoff")? {
            policy = policy.with_backoff(backoff);
        }
        if let Some(jitter) = args.parse("jitter")? {
            policy = policy.with_jitter(jitter);
        }
        Ok(policy)
    }
}

#[async_trait]
impl Brick for RetryBrick {
    fn id(&self) -> &str {
        ids::RETRY
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn description(&self) -> &str {
        "Retry a pipeline when it fails"
    }

    fn input_schema(&self) -> Value {
        required_schema(
            json!({
                "body": {"description": "Pipeline to retry"},
                "maxRetries": {"type": "integer", "minimum": 0, "default": 3},
                "intervalMillis": {"type": "integer", "minimum": 0, "default": 0},
                "backoff": {"type": "string", "enum": ["constant", "linear", "exponential"]},
                "jitter": {"type": "string", "enum": ["none", "full", "equal"]},
            }),
            &["body"],
        )
    }

    fn is_control_flow(&self) -> bool {
        true
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        let body = args.require_pipeline("body")?;
        let policy = Self::policy(&args)?;

        let mut attempt: u32 = 0;
        loop {
            let err = match options
                .run_branch(body, BranchFrame::new("body", attempt as usize), Map::new())
                .await
            {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.is_cancellation() || !err.is_catchable() || attempt >= policy.max_retries {
                return Err(err);
            }

            let delay = policy.delay_for(attempt);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after error"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = options.abort_signal.cancelled() => {
                    let reason = options
                        .abort_signal
                        .reason()
                        .unwrap_or_else(|| "aborted".to_string());
                    return Err(CancelError::new(reason).into());
                }
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bricks::{BrickRegistry, FnBrick};
    use crate::errors::BrickExecutionError;
    use crate::expression::ConfigValue;
    use crate::pipeline::{BrickInvocation, Pipeline, PipelineExecutor, RunOptions};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn executor() -> PipelineExecutor {
        let registry = BrickRegistry::with_builtins();
        registry.register(Arc::new(FnBrick::new(
            "test/throw",
            BrickKind::Transform,
            |args| async move {
                let message = args.get_str("message").unwrap_or("boom").to_string();
                Err(BrickExecutionError::new(message).into())
            },
        )));
        PipelineExecutor::new(Arc::new(registry))
    }

    fn echo(message: &str) -> BrickInvocation {
        BrickInvocation::new(ids::ECHO).with_config("message", message)
    }

    async fn run(executor: &PipelineExecutor, pipeline: Pipeline) -> Result<Value, BrickflowError> {
        executor.run(&pipeline, Value::Null, RunOptions::new()).await
    }

    #[tokio::test]
    async fn test_if_else_picks_branch() {
        let executor = executor();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::IF_ELSE)
            .with_config("condition", ConfigValue::template("{{ @flag }}"))
            .with_config("if", ConfigValue::pipeline(vec![echo("yes")]))
            .with_config("else", ConfigValue::pipeline(vec![echo("no")]))]);

        let yes = executor
            .run(&pipeline, json!({"flag": true}), RunOptions::new())
            .await
            .unwrap();
        let no = executor
            .run(&pipeline, json!({"flag": "false"}), RunOptions::new())
            .await
            .unwrap();
        assert_eq!(yes, json!("yes"));
        assert_eq!(no, json!("no"));
    }

    #[tokio::test]
    async fn test_if_else_without_else_returns_null() {
        let executor = executor();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::IF_ELSE)
            .with_config("condition", json!(false))
            .with_config("if", ConfigValue::pipeline(vec![echo("yes")]))]);

        assert_eq!(run(&executor, pipeline).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_except_receives_error() {
        let executor = executor();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::TRY_EXCEPT)
            .with_config(
                "try",
                ConfigValue::pipeline(vec![
                    BrickInvocation::new("test/throw").with_config("message", "bad input")
                ]),
            )
            .with_config(
                "except",
                ConfigValue::pipeline(vec![BrickInvocation::new(ids::ECHO).with_config(
                    "message",
                    ConfigValue::template("{{ @error.name }}: {{ @error.message }}"),
                )]),
            )]);

        let output = run(&executor, pipeline).await.unwrap();
        assert_eq!(output, json!("BrickExecutionError: bad input"));
    }

    #[tokio::test]
    async fn test_try_requires_pipeline() {
        let executor = executor();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::TRY_EXCEPT)]);

        let err = run(&executor, pipeline).await.unwrap_err();
        assert_eq!(err.to_serialized().property.as_deref(), Some("try"));
    }

    #[tokio::test]
    async fn test_try_does_not_catch_unknown_bricks() {
        let executor = executor();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::TRY_EXCEPT)
            .with_config(
                "try",
                ConfigValue::pipeline(vec![BrickInvocation::new("test/not-registered")]),
            )
            .with_config("except", ConfigValue::pipeline(vec![echo("caught")]))]);

        let err = run(&executor, pipeline).await.unwrap_err();
        assert!(matches!(err, BrickflowError::BrickNotFound(_)));
    }

    #[tokio::test]
    async fn test_run_returns_body_result() {
        let executor = executor();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::RUN)
            .with_config("body", ConfigValue::pipeline(vec![echo("inner")]))]);

        assert_eq!(run(&executor, pipeline).await.unwrap(), json!("inner"));
    }

    #[tokio::test]
    async fn test_async_run_is_detached() {
        let executor = executor();
        let inner = echo("later");
        let inner_id = inner.instance_id.clone();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::RUN)
            .with_config("body", ConfigValue::pipeline(vec![inner]))
            .with_config("async", json!(true))]);

        let result = executor
            .run_detailed(&pipeline, Value::Null, RunOptions::new())
            .await;
        assert_eq!(result.output(), Some(&json!({})));

        executor.join_detached().await;
        let records = executor.recorder().latest_run(&inner_id);
        assert_eq!(records.len(), 1);
        assert_ne!(records[0].run_id, result.run_id);
        assert!(executor.detached_runs().is_empty());
    }

    #[tokio::test]
    async fn test_for_each_binds_elements() {
        let executor = executor();
        let body = BrickInvocation::new(ids::ECHO)
            .with_config("message", ConfigValue::template("item {{ @item }}"));
        let body_id = body.instance_id.clone();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::FOR_EACH)
            .with_config("elements", json!([1, 2, 3]))
            .with_config("elementKey", "item")
            .with_config("body", ConfigValue::pipeline(vec![body]))]);

        let output = run(&executor, pipeline).await.unwrap();
        assert_eq!(output, json!("item 3"));

        let records = executor.recorder().latest_run(&body_id);
        assert_eq!(records.len(), 3);
        let counters: Vec<usize> = records.iter().map(|r| r.branches[0].counter).collect();
        assert_eq!(counters, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = BrickRegistry::with_builtins();
        registry.register(Arc::new(FnBrick::new(
            "test/flaky",
            BrickKind::Transform,
            move |_args| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(BrickExecutionError::new("not yet").into())
                    } else {
                        Ok(json!("done"))
                    }
                }
            },
        )));
        let executor = PipelineExecutor::new(Arc::new(registry));
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::RETRY)
            .with_config("body", ConfigValue::pipeline(vec![BrickInvocation::new("test/flaky")]))
            .with_config("maxRetries", json!(5))]);

        let output = run(&executor, pipeline).await.unwrap();
        assert_eq!(output, json!("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let executor = executor();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::RETRY)
            .with_config("body", ConfigValue::pipeline(vec![BrickInvocation::new("test/throw")]))
            .with_config("maxRetries", json!(2))]);

        let err = run(&executor, pipeline).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_retry_never_retries_cancellation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = BrickRegistry::with_builtins();
        registry.register(Arc::new(FnBrick::new(
            "test/cancelled",
            BrickKind::Transform,
            move |_args| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(CancelError::new("stopped").into()) }
            },
        )));
        let executor = PipelineExecutor::new(Arc::new(registry));
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::RETRY).with_config(
            "body",
            ConfigValue::pipeline(vec![BrickInvocation::new("test/cancelled")]),
        )]);

        let err = run(&executor, pipeline).await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_plain_brick_cannot_run_thunks() {
        let executor = executor();
        let brick = crate::bricks::EchoBrick;
        let options = executor.options_for(&brick, crate::context::RunIdentity::new());
        let thunk = crate::pipeline::PipelineThunk::new(
            Arc::new(Pipeline::new(vec![echo("x")])),
            crate::context::BrickContext::new(),
            crate::pipeline::PositionPath::root(),
        );

        let err = options.run_pipeline(&thunk, Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("not permitted"));
    }
}
