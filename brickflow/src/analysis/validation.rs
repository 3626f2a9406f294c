//! Structural validation of pipeline configurations.

use super::annotation::{Annotation, AnnotationSeverity};
use super::visitor::{visit_pipeline, Ancestor, PipelineVisitor};
use crate::bricks::BrickRegistry;
use crate::context::RootMode;
use crate::expression::{ConfigValue, Template, VariablePath};
use crate::pipeline::{BrickInvocation, InstanceId, Pipeline, PositionPath};
use crate::utils::is_valid_variable_name;
use serde_json::Value;
use std::collections::HashMap;

const ANALYSIS: &str = "validation";

/// Context names an output key should not shadow.
const RESERVED_KEYS: &[&str] = &["input", "options", "mod", "run", "error"];

/// Visitor checking invocations against the registry and expression syntax.
#[derive(Debug)]
pub struct PipelineValidator<'r> {
    registry: &'r BrickRegistry,
    seen: HashMap<InstanceId, PositionPath>,
    annotations: Vec<Annotation>,
}

impl<'r> PipelineValidator<'r> {
    /// Creates a validator.
    #[must_use]
    pub fn new(registry: &'r BrickRegistry) -> Self {
        Self {
            registry,
            seen: HashMap::new(),
            annotations: Vec::new(),
        }
    }

    /// Returns the findings in traversal order.
    #[must_use]
    pub fn into_annotations(self) -> Vec<Annotation> {
        self.annotations
    }

    fn push(
        &mut self,
        severity: AnnotationSeverity,
        invocation: &BrickInvocation,
        position: &PositionPath,
        field: Option<String>,
        message: String,
    ) {
        let mut annotation = Annotation::new(
            ANALYSIS,
            severity,
            position.clone(),
            invocation.instance_id.clone(),
            message,
        );
        annotation.field = field;
        self.annotations.push(annotation);
    }

    fn check_expressions(
        &mut self,
        invocation: &BrickInvocation,
        position: &PositionPath,
        field: &str,
        value: &ConfigValue,
    ) {
        let error = match value {
            ConfigValue::Template { engine, source } => Template::parse(*engine, source).err(),
            ConfigValue::Var(path) => VariablePath::parse(path).err(),
            ConfigValue::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.check_expressions(invocation, position, &format!("{field}.{index}"), item);
                }
                None
            }
            ConfigValue::Object(fields) => {
                for (key, item) in fields {
                    self.check_expressions(invocation, position, &format!("{field}.{key}"), item);
                }
                None
            }
            ConfigValue::Literal(_) | ConfigValue::Pipeline(_) => None,
        };
        if let Some(error) = error {
            self.push(
                AnnotationSeverity::Error,
                invocation,
                position,
                Some(field.to_string()),
                format!("Invalid expression `{}`: {}", error.expression, error.reason),
            );
        }
    }

    fn check_required(
        &mut self,
        invocation: &BrickInvocation,
        position: &PositionPath,
        schema: &Value,
    ) {
        let Some(required) = schema.get("required").and_then(Value::as_array) else {
            return;
        };
        for key in required.iter().filter_map(Value::as_str) {
            let missing = match invocation.config.get(key) {
                None | Some(ConfigValue::Literal(Value::Null)) => true,
                Some(ConfigValue::Literal(Value::String(s))) => s.trim().is_empty(),
                Some(_) => false,
            };
            if missing {
                self.push(
                    AnnotationSeverity::Error,
                    invocation,
                    position,
                    Some(format!("config.{key}")),
                    format!("{key} is required"),
                );
            }
        }
    }

    fn check_output_key(&mut self, invocation: &BrickInvocation, position: &PositionPath) {
        let Some(key) = &invocation.output_key else {
            return;
        };
        let name = key.trim_start_matches('@');
        if !is_valid_variable_name(name) {
            self.push(
                AnnotationSeverity::Error,
                invocation,
                position,
                Some("outputKey".to_string()),
                format!("'{key}' is not a valid output key"),
            );
        } else if RESERVED_KEYS.contains(&name) {
            self.push(
                AnnotationSeverity::Warning,
                invocation,
                position,
                Some("outputKey".to_string()),
                format!("Output key '{key}' shadows @{name}"),
            );
        }
    }

    fn check_root(&mut self, invocation: &BrickInvocation, position: &PositionPath, root_aware: Option<bool>) {
        if invocation.root_mode == RootMode::Element
            && invocation.root.as_deref().map_or(true, |s| s.trim().is_empty())
        {
            self.push(
                AnnotationSeverity::Error,
                invocation,
                position,
                Some("root".to_string()),
                "Element root mode requires a selector".to_string(),
            );
        }
        if !invocation.root_mode.is_inherit() && root_aware == Some(false) {
            self.push(
                AnnotationSeverity::Warning,
                invocation,
                position,
                Some("rootMode".to_string()),
                format!("Brick '{}' ignores its root", invocation.id),
            );
        }
    }
}

impl<'a> PipelineVisitor<'a> for PipelineValidator<'_> {
    fn visit_invocation(
        &mut self,
        invocation: &'a BrickInvocation,
        position: &PositionPath,
        _ancestors: &[Ancestor<'a>],
    ) {
        if let Some(first) = self.seen.get(&invocation.instance_id).cloned() {
            self.push(
                AnnotationSeverity::Error,
                invocation,
                position,
                Some("instanceId".to_string()),
                format!(
                    "Instance id {} is already used at position {first}",
                    invocation.instance_id
                ),
            );
        } else {
            self.seen
                .insert(invocation.instance_id.clone(), position.clone());
        }

        let brick = self.registry.lookup(&invocation.id).ok();
        match &brick {
            Some(brick) => self.check_required(invocation, position, &brick.input_schema()),
            None => self.push(
                AnnotationSeverity::Error,
                invocation,
                position,
                Some("id".to_string()),
                format!("Unknown brick '{}'", invocation.id),
            ),
        }

        if let Some(condition) = &invocation.condition {
            self.check_expressions(invocation, position, "if", condition);
        }
        for (key, value) in &invocation.config {
            self.check_expressions(invocation, position, &format!("config.{key}"), value);
        }
        self.check_output_key(invocation, position);
        self.check_root(invocation, position, brick.map(|brick| brick.is_root_aware()));
    }
}

/// Validates a pipeline tree and returns its findings in traversal order.
#[must_use]
pub fn validate_pipeline(pipeline: &Pipeline, registry: &BrickRegistry) -> Vec<Annotation> {
    let mut validator = PipelineValidator::new(registry);
    visit_pipeline(&mut validator, pipeline);
    validator.into_annotations()
}
