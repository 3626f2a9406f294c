//! Collects the mod variable names a set of pipelines reads or writes.

use super::visitor::{visit_pipeline, Ancestor, PipelineVisitor};
use crate::bricks::ids;
use crate::expression::{ConfigValue, PathSegment, Template, VariablePath};
use crate::pipeline::{BrickInvocation, Pipeline, PositionPath};
use serde_json::Value;
use std::collections::BTreeSet;

/// Visitor gathering `@mod.<name>` references and assigned variable names.
///
/// Malformed expressions are ignored here; validation reports them.
#[derive(Debug, Default)]
pub struct ModVariableCollector {
    names: BTreeSet<String>,
}

impl ModVariableCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected names, sorted.
    #[must_use]
    pub fn into_names(self) -> BTreeSet<String> {
        self.names
    }

    fn add_path(&mut self, path: &VariablePath) {
        if path.root() != "mod" {
            return;
        }
        if let Some(PathSegment::Key(name)) = path.segments().first() {
            self.names.insert(name.clone());
        }
    }

    fn scan(&mut self, value: &ConfigValue) {
        match value {
            ConfigValue::Var(path) => {
                if let Ok(path) = VariablePath::parse(path) {
                    self.add_path(&path);
                }
            }
            ConfigValue::Template { engine, source } => {
                if let Ok(template) = Template::parse(*engine, source) {
                    for path in template.variables() {
                        self.add_path(path);
                    }
                }
            }
            ConfigValue::Array(items) => items.iter().for_each(|item| self.scan(item)),
            ConfigValue::Object(fields) => fields.values().for_each(|item| self.scan(item)),
            // Nested pipelines are visited as invocations of their own.
            ConfigValue::Literal(_) | ConfigValue::Pipeline(_) => {}
        }
    }

    fn add_declared(&mut self, invocation: &BrickInvocation, field: &str) {
        if let Some(ConfigValue::Literal(Value::String(name))) = invocation.config.get(field) {
            let name = name.trim_start_matches('@');
            if !name.is_empty() {
                self.names.insert(name.to_string());
            }
        }
    }
}

impl<'a> PipelineVisitor<'a> for ModVariableCollector {
    fn visit_invocation(
        &mut self,
        invocation: &'a BrickInvocation,
        _position: &PositionPath,
        _ancestors: &[Ancestor<'a>],
    ) {
        if let Some(condition) = &invocation.condition {
            self.scan(condition);
        }
        for value in invocation.config.values() {
            self.scan(value);
        }
        match invocation.id.as_str() {
            ids::ASSIGN => self.add_declared(invocation, "variableName"),
            ids::WITH_ASYNC => self.add_declared(invocation, "stateKey"),
            _ => {}
        }
    }
}

/// Returns every mod variable name referenced or assigned across `pipelines`.
pub fn collect_mod_variable_names<'a, I>(pipelines: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Pipeline>,
{
    let mut collector = ModVariableCollector::new();
    for pipeline in pipelines {
        visit_pipeline(&mut collector, pipeline);
    }
    collector.into_names()
}
