//! Maps trace errors back onto the configuration fields that caused them.

use super::annotation::{Annotation, AnnotationSeverity};
use super::visitor::{visit_pipeline, Ancestor, PipelineVisitor};
use crate::pipeline::{BrickInvocation, InstanceId, Pipeline, PositionPath};
use crate::trace::TraceRecord;
use std::collections::{HashMap, HashSet};

const ANALYSIS: &str = "trace";

/// Invocation fields that are not part of `config`.
const TOP_LEVEL_FIELDS: &[&str] = &["if", "root", "rootMode", "outputKey", "id"];

#[derive(Default)]
struct InvocationIndex<'a> {
    by_instance: HashMap<&'a InstanceId, (PositionPath, &'a BrickInvocation)>,
}

impl<'a> PipelineVisitor<'a> for InvocationIndex<'a> {
    fn visit_invocation(
        &mut self,
        invocation: &'a BrickInvocation,
        position: &PositionPath,
        _ancestors: &[Ancestor<'a>],
    ) {
        self.by_instance
            .entry(&invocation.instance_id)
            .or_insert_with(|| (position.clone(), invocation));
    }
}

fn field_for(property: &str) -> String {
    if property.starts_with("config.") || TOP_LEVEL_FIELDS.contains(&property) {
        property.to_string()
    } else {
        format!("config.{property}")
    }
}

/// Annotates the invocations whose latest trace records failed.
///
/// Positions are re-derived from the current configuration and matched by
/// instance id. Errors that propagated out of a nested invocation are only
/// reported where they originated. When the invocation's configuration has
/// changed since the trace was recorded, the annotation is downgraded to a
/// warning.
#[must_use]
pub fn annotate_trace_errors(pipeline: &Pipeline, records: &[TraceRecord]) -> Vec<Annotation> {
    let mut index = InvocationIndex::default();
    visit_pipeline(&mut index, pipeline);

    let mut seen = HashSet::new();
    let mut annotations = Vec::new();
    for record in records {
        let Some(error) = record.error() else {
            continue;
        };
        if error
            .instance_id
            .as_ref()
            .is_some_and(|origin| origin != &record.instance_id)
        {
            continue;
        }
        let Some((position, invocation)) = index.by_instance.get(&record.instance_id) else {
            continue;
        };

        let field = error.property.as_deref().map(field_for);
        if !seen.insert((record.instance_id.clone(), field.clone(), error.message.clone())) {
            continue;
        }

        let stale = record.config_hash != invocation.fingerprint();
        let (severity, message) = if stale {
            (
                AnnotationSeverity::Warning,
                format!("{} (configuration changed since this error)", error.message),
            )
        } else {
            (AnnotationSeverity::Error, error.message.clone())
        };

        let mut annotation = Annotation::new(
            ANALYSIS,
            severity,
            position.clone(),
            record.instance_id.clone(),
            message,
        );
        annotation.field = field;
        annotations.push(annotation);
    }

    annotations.sort_by(|a, b| a.position.cmp(&b.position));
    annotations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bricks::{ids, BrickKind, BrickRegistry, FnBrick};
    use crate::errors::PropError;
    use crate::expression::ConfigValue;
    use crate::pipeline::{PipelineExecutor, RunOptions};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::sync::Arc;

    fn executor() -> PipelineExecutor {
        let registry = BrickRegistry::with_builtins();
        registry.register(Arc::new(FnBrick::new(
            "test/title",
            BrickKind::Renderer,
            |args| async move {
                let title = args.require_str("title")?;
                if title.trim().is_empty() {
                    return Err(PropError::new("title", "title must not be blank").into());
                }
                Ok(Value::String(title.to_string()))
            },
        )));
        PipelineExecutor::new(Arc::new(registry))
    }

    fn nested(title: &str) -> Pipeline {
        Pipeline::new(vec![BrickInvocation::new(ids::IF_ELSE)
            .with_instance_id("outer")
            .with_config("condition", Value::Bool(true))
            .with_config(
                "if",
                ConfigValue::pipeline(vec![BrickInvocation::new("test/title")
                    .with_instance_id("inner")
                    .with_config("title", title)]),
            )])
    }

    #[tokio::test]
    async fn test_maps_error_to_field() {
        let executor = executor();
        let pipeline = nested(" ");
        let result = executor
            .run_detailed(&pipeline, Value::Null, RunOptions::new())
            .await;
        assert!(!result.is_success());

        let records = executor.recorder().run_records(result.run_id);
        let annotations = annotate_trace_errors(&pipeline, &records);

        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].path(), "0.if.0.config.title");
        assert_eq!(annotations[0].instance_id.as_str(), "inner");
        assert_eq!(annotations[0].severity, AnnotationSeverity::Error);
    }

    #[tokio::test]
    async fn test_stale_trace_is_warning() {
        let executor = executor();
        let result = executor
            .run_detailed(&nested(""), Value::Null, RunOptions::new())
            .await;
        let records = executor.recorder().run_records(result.run_id);

        let edited = nested("Fixed");
        let annotations = annotate_trace_errors(&edited, &records);
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].severity, AnnotationSeverity::Warning);
        assert!(annotations[0].message.contains("configuration changed"));
    }

    #[test]
    fn test_field_mapping() {
        assert_eq!(field_for("title"), "config.title");
        assert_eq!(field_for("config.body.0"), "config.body.0");
        assert_eq!(field_for("if"), "if");
        assert_eq!(field_for("root"), "root");
    }
}
