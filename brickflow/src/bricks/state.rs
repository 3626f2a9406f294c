//! Bricks that read and write mod variable state.

use super::{ids, required_schema, Brick, BrickArgs, BrickKind};
use crate::context::PlatformCapability;
use crate::errors::{BrickflowError, PropError};
use crate::pipeline::BrickOptions;
use crate::state::{MergeStrategy, ModVariableStore, StateNamespace};
use crate::utils::{generate_uuid, is_valid_variable_name};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Validates a mod variable name.
fn validate_variable_name(property: &str, name: &str) -> Result<(), PropError> {
    if is_valid_variable_name(name) {
        Ok(())
    } else {
        Err(PropError::new(
            property,
            format!("'{name}' is not a valid variable name"),
        ))
    }
}

/// Which namespace a state brick addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateScope {
    /// The running mod's variables (`@mod`).
    #[default]
    Mod,
    /// State private to the running component.
    Private,
    /// State shared by every mod.
    Shared,
}

impl StateScope {
    /// Returns the namespace this scope addresses for the current run.
    #[must_use]
    pub fn namespace(self, options: &BrickOptions) -> StateNamespace {
        match self {
            Self::Mod => options.mod_namespace(),
            Self::Private => StateNamespace::for_component(&options.identity),
            Self::Shared => StateNamespace::Shared,
        }
    }
}

/// Assigns one mod variable, shallow-merging it into `@mod`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignModVariableBrick;

#[async_trait]
impl Brick for AssignModVariableBrick {
    fn id(&self) -> &str {
        ids::ASSIGN
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn description(&self) -> &str {
        "Assign a mod variable"
    }

    fn input_schema(&self) -> Value {
        required_schema(
            json!({
                "variableName": {"type": "string"},
                "value": {"description": "The value to assign"},
            }),
            &["variableName"],
        )
    }

    fn required_capabilities(&self) -> Vec<PlatformCapability> {
        vec![PlatformCapability::State]
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        let name = args.require_str("variableName")?;
        let name = name.trim_start_matches('@');
        validate_variable_name("variableName", name)?;

        let value = args.get("value").cloned().unwrap_or(Value::Null);
        options
            .state
            .assign(&options.mod_namespace(), name, value.clone())?;
        options.logger.debug(&format!("Assigned mod variable {name}"));
        Ok(value)
    }
}

/// Returns the state of a namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetStateBrick;

#[async_trait]
impl Brick for GetStateBrick {
    fn id(&self) -> &str {
        ids::GET_STATE
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Reader
    }

    fn description(&self) -> &str {
        "Read mod or shared state"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "namespace": {"type": "string", "enum": ["mod", "private", "shared"], "default": "mod"},
            },
        })
    }

    fn required_capabilities(&self) -> Vec<PlatformCapability> {
        vec![PlatformCapability::State]
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        let scope: StateScope = args.parse("namespace")?.unwrap_or_default();
        Ok(options.state.get(&scope.namespace(options)))
    }
}

/// Merges data into a namespace and returns the new state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetStateBrick;

#[async_trait]
impl Brick for SetStateBrick {
    fn id(&self) -> &str {
        ids::SET_STATE
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn description(&self) -> &str {
        "Update mod or shared state"
    }

    fn input_schema(&self) -> Value {
        required_schema(
            json!({
                "namespace": {"type": "string", "enum": ["mod", "private", "shared"], "default": "mod"},
                "data": {"type": "object"},
                "mergeStrategy": {"type": "string", "enum": ["replace", "shallow", "deep"], "default": "shallow"},
            }),
            &["data"],
        )
    }

    fn required_capabilities(&self) -> Vec<PlatformCapability> {
        vec![PlatformCapability::State]
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        let scope: StateScope = args.parse("namespace")?.unwrap_or_default();
        let strategy: MergeStrategy = args.parse("mergeStrategy")?.unwrap_or_default();
        let data = args.require("data")?.clone();
        options.state.set(&scope.namespace(options), data, strategy)
    }
}

/// Runs `body` in the background and mirrors its progress into the mod
/// variable `stateKey`.
///
/// The variable holds `{isLoading, isFetching, isSuccess, isError, data,
/// error, requestId}`. A completion whose request id is no longer current is
/// discarded, so a slow earlier run cannot overwrite a newer one.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithAsyncModVariableBrick;

struct AsyncStateWriter {
    store: Arc<ModVariableStore>,
    namespace: StateNamespace,
    key: String,
    request_id: String,
}

impl AsyncStateWriter {
    /// Writes the outcome unless a newer request has taken over the key.
    ///
    /// The request id check and the write happen in one store update.
    fn complete(&self, result: Result<Value, BrickflowError>) {
        let written = self.store.update(&self.namespace, |current| {
            let previous = current.get(&self.key);
            let is_current = previous
                .and_then(|state| state.get("requestId"))
                .and_then(Value::as_str)
                == Some(self.request_id.as_str());
            if !is_current {
                return None;
            }

            let state = match &result {
                Ok(data) => json!({
                    "isLoading": false,
                    "isFetching": false,
                    "isSuccess": true,
                    "isError": false,
                    "data": data,
                    "error": null,
                    "requestId": self.request_id,
                }),
                Err(err) => json!({
                    "isLoading": false,
                    "isFetching": false,
                    "isSuccess": false,
                    "isError": true,
                    "data": previous
                        .and_then(|state| state.get("data"))
                        .cloned()
                        .unwrap_or(Value::Null),
                    "error": err.to_serialized().to_value(),
                    "requestId": self.request_id,
                }),
            };

            let mut next = current.clone();
            next.insert(self.key.clone(), state);
            Some(next)
        });

        if written.is_none() {
            tracing::debug!(
                key = %self.key,
                request_id = %self.request_id,
                "Ignoring stale async result"
            );
        }
    }
}

#[async_trait]
impl Brick for WithAsyncModVariableBrick {
    fn id(&self) -> &str {
        ids::WITH_ASYNC
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn description(&self) -> &str {
        "Run a pipeline in the background and track it in a mod variable"
    }

    fn input_schema(&self) -> Value {
        required_schema(
            json!({
                "body": {"description": "The pipeline to run"},
                "stateKey": {"type": "string"},
            }),
            &["body", "stateKey"],
        )
    }

    fn required_capabilities(&self) -> Vec<PlatformCapability> {
        vec![PlatformCapability::State]
    }

    fn is_control_flow(&self) -> bool {
        true
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions) -> Result<Value, BrickflowError> {
        let body = args.require_pipeline("body")?;
        let key = args.require_str("stateKey")?.trim_start_matches('@').to_string();
        validate_variable_name("stateKey", &key)?;

        let namespace = options.mod_namespace();
        let previous = options
            .state
            .get_key(&namespace, &key)
            .and_then(|state| state.get("data").cloned())
            .unwrap_or(Value::Null);
        let request_id = generate_uuid().to_string();

        options.state.assign(
            &namespace,
            &key,
            json!({
                "isLoading": previous.is_null(),
                "isFetching": true,
                "isSuccess": false,
                "isError": false,
                "data": previous,
                "error": null,
                "requestId": request_id,
            }),
        )?;

        let writer = AsyncStateWriter {
            store: options.state.clone(),
            namespace,
            key,
            request_id: request_id.clone(),
        };
        options.spawn_pipeline_with(body, Map::new(), move |result| writer.complete(result))?;

        Ok(json!({"requestId": request_id}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bricks::{BrickRegistry, FnBrick};
    use crate::context::RunIdentity;
    use crate::errors::BrickExecutionError;
    use crate::expression::ConfigValue;
    use crate::pipeline::{BrickInvocation, Pipeline, PipelineExecutor, RunOptions};
    use pretty_assertions::assert_eq;

    fn executor() -> PipelineExecutor {
        let registry = BrickRegistry::with_builtins();
        registry.register(Arc::new(FnBrick::new(
            "test/throw",
            BrickKind::Transform,
            |_args| async move { Err(BrickExecutionError::new("request failed").into()) },
        )));
        PipelineExecutor::new(Arc::new(registry))
    }

    fn mod_namespace() -> StateNamespace {
        StateNamespace::Mod {
            mod_id: "mod-1".into(),
        }
    }

    #[tokio::test]
    async fn test_assign_writes_mod_namespace() {
        let executor = executor();
        let brick = AssignModVariableBrick;
        let options = executor.options_for(&brick, RunIdentity::new().with_mod_id("mod-1"));
        let args = BrickArgs::from_value(json!({"variableName": "@count", "value": 3}));

        let output = brick.run(args, &options).await.unwrap();
        assert_eq!(output, json!(3));
        assert_eq!(executor.state().get_key(&mod_namespace(), "count"), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_assign_rejects_bad_name() {
        let executor = executor();
        let brick = AssignModVariableBrick;
        let options = executor.options_for(&brick, RunIdentity::new());
        let args = BrickArgs::from_value(json!({"variableName": "not valid"}));

        let err = brick.run(args, &options).await.unwrap_err();
        assert_eq!(err.to_serialized().property.as_deref(), Some("variableName"));
    }

    #[tokio::test]
    async fn test_set_and_get_state() {
        let executor = executor();
        let pipeline = Pipeline::new(vec![
            BrickInvocation::new(ids::SET_STATE)
                .with_config("namespace", "shared")
                .with_config("data", json!({"a": 1})),
            BrickInvocation::new(ids::SET_STATE)
                .with_config("namespace", "shared")
                .with_config("data", json!({"b": 2})),
            BrickInvocation::new(ids::GET_STATE).with_config("namespace", "shared"),
        ]);

        let output = executor.run(&pipeline, Value::Null, RunOptions::new()).await.unwrap();
        assert_eq!(output, json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn test_private_scope_is_per_component() {
        let executor = executor();
        let set = Pipeline::new(vec![BrickInvocation::new(ids::SET_STATE)
            .with_config("namespace", "private")
            .with_config("data", json!({"open": true}))]);
        let get = Pipeline::new(vec![
            BrickInvocation::new(ids::GET_STATE).with_config("namespace", "private")
        ]);

        executor
            .run(&set, Value::Null, RunOptions::new().with_component_id("panel"))
            .await
            .unwrap();
        let same = executor
            .run(&get, Value::Null, RunOptions::new().with_component_id("panel"))
            .await
            .unwrap();
        let other = executor
            .run(&get, Value::Null, RunOptions::new().with_component_id("button"))
            .await
            .unwrap();
        assert_eq!(same, json!({"open": true}));
        assert_eq!(other, json!({}));
    }

    #[tokio::test]
    async fn test_with_async_success() {
        let executor = executor();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::WITH_ASYNC)
            .with_config("stateKey", "profile")
            .with_config(
                "body",
                ConfigValue::pipeline(vec![
                    BrickInvocation::new(ids::ECHO).with_config("message", "loaded")
                ]),
            )]);

        executor
            .run(&pipeline, Value::Null, RunOptions::new().with_mod_id("mod-1"))
            .await
            .unwrap();
        executor.join_detached().await;

        let state = executor.state().get_key(&mod_namespace(), "profile").unwrap();
        assert_eq!(state["isSuccess"], json!(true));
        assert_eq!(state["isLoading"], json!(false));
        assert_eq!(state["data"], json!("loaded"));
    }

    #[tokio::test]
    async fn test_with_async_error() {
        let executor = executor();
        let pipeline = Pipeline::new(vec![BrickInvocation::new(ids::WITH_ASYNC)
            .with_config("stateKey", "profile")
            .with_config(
                "body",
                ConfigValue::pipeline(vec![BrickInvocation::new("test/throw")]),
            )]);

        executor
            .run(&pipeline, Value::Null, RunOptions::new().with_mod_id("mod-1"))
            .await
            .unwrap();
        executor.join_detached().await;

        let state = executor.state().get_key(&mod_namespace(), "profile").unwrap();
        assert_eq!(state["isError"], json!(true));
        assert_eq!(state["error"]["message"], json!("request failed"));
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let store = Arc::new(ModVariableStore::new());
        let namespace = mod_namespace();
        store
            .assign(&namespace, "profile", json!({"requestId": "newer"}))
            .unwrap();

        let writer = AsyncStateWriter {
            store: store.clone(),
            namespace: namespace.clone(),
            key: "profile".into(),
            request_id: "older".into(),
        };
        writer.complete(Ok(json!("stale")));

        assert_eq!(
            store.get_key(&namespace, "profile"),
            Some(json!({"requestId": "newer"}))
        );
    }

    #[test]
    fn test_newer_request_always_wins_race() {
        let store = Arc::new(ModVariableStore::new());
        let namespace = mod_namespace();
        let newer = json!({"requestId": "newer", "isFetching": true});

        for _ in 0..200 {
            store
                .assign(&namespace, "profile", json!({"requestId": "older"}))
                .unwrap();
            let writer = AsyncStateWriter {
                store: store.clone(),
                namespace: namespace.clone(),
                key: "profile".into(),
                request_id: "older".into(),
            };
            let completion = std::thread::spawn(move || writer.complete(Ok(json!("stale"))));
            store.assign(&namespace, "profile", newer.clone()).unwrap();
            completion.join().unwrap();

            assert_eq!(store.get_key(&namespace, "profile"), Some(newer.clone()));
        }
    }
}
