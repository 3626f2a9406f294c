//! Pipeline and brick invocation definitions.

use crate::context::RootMode;
use crate::errors::PipelineValidationError;
use crate::expression::ConfigValue;
use crate::utils::fingerprint_json;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// The stable identifier of a brick invocation.
///
/// Assigned once when an invocation is created and never reused; it is the
/// join key between configurations, trace records and annotations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Creates an instance id from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random instance id.
    #[must_use]
    pub fn generate() -> Self {
        Self(crate::utils::generate_uuid().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One node of a pipeline: a brick id plus its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrickInvocation {
    /// The registry identifier of the brick.
    pub id: String,

    /// The brick's configuration.
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,

    /// Binds the output to `@<output_key>` for later invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    /// Runs the invocation only when this resolves truthy.
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConfigValue>,

    /// How the root element is selected for root-aware bricks.
    #[serde(default, skip_serializing_if = "RootMode::is_inherit")]
    pub root_mode: RootMode,

    /// The selector used when `root_mode` is `element`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,

    /// A human-readable label shown in editors and traces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// The stable instance identifier.
    #[serde(default)]
    pub instance_id: InstanceId,
}

impl BrickInvocation {
    /// Creates an invocation of `brick_id` with a fresh instance id.
    #[must_use]
    pub fn new(brick_id: impl Into<String>) -> Self {
        Self {
            id: brick_id.into(),
            config: BTreeMap::new(),
            output_key: None,
            condition: None,
            root_mode: RootMode::Inherit,
            root: None,
            label: None,
            instance_id: InstanceId::generate(),
        }
    }

    /// Sets a configuration field.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Sets the output key.
    #[must_use]
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Sets the condition.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<ConfigValue>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Sets the root mode and selector.
    #[must_use]
    pub fn with_root(mut self, mode: RootMode, selector: Option<&str>) -> Self {
        self.root_mode = mode;
        self.root = selector.map(ToString::to_string);
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the instance id.
    #[must_use]
    pub fn with_instance_id(mut self, instance_id: impl Into<InstanceId>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Returns the nested pipelines in this invocation's configuration.
    ///
    /// Entries are keyed by dotted field path and ordered the same way the
    /// executor renders them.
    #[must_use]
    pub fn nested_pipelines(&self) -> Vec<(String, &Arc<Pipeline>)> {
        fn collect<'a>(
            value: &'a ConfigValue,
            field: String,
            out: &mut Vec<(String, &'a Arc<Pipeline>)>,
        ) {
            match value {
                ConfigValue::Pipeline(pipeline) => out.push((field, pipeline)),
                ConfigValue::Array(items) => {
                    for (index, item) in items.iter().enumerate() {
                        collect(item, format!("{field}.{index}"), out);
                    }
                }
                ConfigValue::Object(fields) => {
                    for (key, item) in fields {
                        collect(item, format!("{field}.{key}"), out);
                    }
                }
                ConfigValue::Literal(_) | ConfigValue::Template { .. } | ConfigValue::Var(_) => {}
            }
        }

        let mut out = Vec::new();
        for (key, value) in &self.config {
            collect(value, key.clone(), &mut out);
        }
        out
    }

    /// Returns a SHA-256 fingerprint of everything that affects execution.
    ///
    /// The label and instance id are excluded, so renaming an invocation does
    /// not invalidate its traces.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.remove("label");
            map.remove("instanceId");
        }
        fingerprint_json(&value)
    }
}

/// An ordered sequence of brick invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    invocations: Vec<BrickInvocation>,
}

impl Pipeline {
    /// Creates a pipeline from invocations.
    #[must_use]
    pub fn new(invocations: Vec<BrickInvocation>) -> Self {
        Self { invocations }
    }

    /// Appends an invocation.
    #[must_use]
    pub fn with_invocation(mut self, invocation: BrickInvocation) -> Self {
        self.invocations.push(invocation);
        self
    }

    /// Returns the invocations.
    #[must_use]
    pub fn invocations(&self) -> &[BrickInvocation] {
        &self.invocations
    }

    /// Returns the number of top-level invocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    /// Returns true if the pipeline has no invocations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    /// Returns every invocation in the tree, depth-first.
    #[must_use]
    pub fn all_invocations(&self) -> Vec<&BrickInvocation> {
        let mut out = Vec::new();
        self.collect_invocations(&mut out);
        out
    }

    fn collect_invocations<'a>(&'a self, out: &mut Vec<&'a BrickInvocation>) {
        for invocation in &self.invocations {
            out.push(invocation);
            for (_, nested) in invocation.nested_pipelines() {
                nested.collect_invocations(out);
            }
        }
    }

    /// Finds an invocation anywhere in the tree by instance id.
    #[must_use]
    pub fn find(&self, instance_id: &InstanceId) -> Option<&BrickInvocation> {
        self.all_invocations()
            .into_iter()
            .find(|invocation| &invocation.instance_id == instance_id)
    }

    /// Validates the pipeline tree.
    ///
    /// # Errors
    ///
    /// Returns an error if an instance id appears more than once.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for invocation in self.all_invocations() {
            if !seen.insert(&invocation.instance_id) && !duplicates.contains(&invocation.instance_id) {
                duplicates.push(invocation.instance_id.clone());
            }
        }

        if duplicates.is_empty() {
            return Ok(());
        }
        let listed = duplicates
            .iter()
            .map(InstanceId::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Err(PipelineValidationError::new(format!("Duplicate instance ids: {listed}"))
            .with_instances(duplicates))
    }
}

impl From<Vec<BrickInvocation>> for Pipeline {
    fn from(invocations: Vec<BrickInvocation>) -> Self {
        Self::new(invocations)
    }
}

impl FromIterator<BrickInvocation> for Pipeline {
    fn from_iter<I: IntoIterator<Item = BrickInvocation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
