//! Resolves configuration values against a context.

use super::path::VariablePath;
use super::template::Template;
use super::value::ConfigValue;
use crate::bricks::BrickArgs;
use crate::context::BrickContext;
use crate::errors::TemplateError;
use crate::pipeline::{PipelineThunk, PositionPath};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Resolves a configuration value to a plain JSON value.
///
/// Undefined variables resolve to `null`. Nested pipelines are not executed;
/// they resolve to their wire representation.
pub fn resolve(value: &ConfigValue, context: &BrickContext) -> Result<Value, TemplateError> {
    Ok(resolve_optional(value, context)?.unwrap_or(Value::Null))
}

/// Resolves a configuration value, returning `None` when it is undefined.
pub fn resolve_optional(
    value: &ConfigValue,
    context: &BrickContext,
) -> Result<Option<Value>, TemplateError> {
    render_value(value, context, None, &mut Renderer::Eager)
}

/// Renders an invocation's configuration into brick arguments.
///
/// Pipeline-valued fields become thunks bound to `context`, keyed by their
/// dotted field path. Errors carry the `config.<field>` path that produced
/// them.
pub fn render_args(
    config: &BTreeMap<String, ConfigValue>,
    context: &BrickContext,
    position: &PositionPath,
) -> Result<BrickArgs, TemplateError> {
    let mut renderer = Renderer::Thunks {
        position,
        context,
        thunks: BTreeMap::new(),
    };

    let mut values = Map::new();
    for (key, value) in config {
        if let Some(rendered) = render_value(value, context, Some(key), &mut renderer)? {
            values.insert(key.clone(), rendered);
        }
    }

    let pipelines = match renderer {
        Renderer::Thunks { thunks, .. } => thunks,
        Renderer::Eager => BTreeMap::new(),
    };
    Ok(BrickArgs::new(values, pipelines))
}

/// Returns whether a resolved condition value counts as true.
///
/// Missing values, `null`, `false`, `0`, the empty string and the strings
/// `false`, `0`, `no`, `off`, `f` and `n` (any case) are false.
#[must_use]
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(true, |f| f != 0.0),
        Some(Value::String(s)) => {
            let s = s.trim().to_ascii_lowercase();
            !matches!(s.as_str(), "" | "false" | "0" | "no" | "off" | "f" | "n")
        }
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

enum Renderer<'a> {
    Eager,
    Thunks {
        position: &'a PositionPath,
        context: &'a BrickContext,
        thunks: BTreeMap<String, PipelineThunk>,
    },
}

fn render_value(
    value: &ConfigValue,
    context: &BrickContext,
    field: Option<&str>,
    renderer: &mut Renderer<'_>,
) -> Result<Option<Value>, TemplateError> {
    let attach = |err: TemplateError| match field {
        Some(field) if err.field.is_none() => err.with_field(format!("config.{field}")),
        _ => err,
    };

    match value {
        ConfigValue::Literal(value) => Ok(Some(value.clone())),
        ConfigValue::Template { engine, source } => {
            let template = Template::parse(*engine, source).map_err(attach)?;
            Ok(Some(Value::String(template.render(context))))
        }
        ConfigValue::Var(path) => {
            let path = VariablePath::parse(path).map_err(attach)?;
            Ok(path.lookup(context).cloned())
        }
        ConfigValue::Pipeline(pipeline) => {
            if let Renderer::Thunks {
                position,
                context: bound,
                thunks,
            } = renderer
            {
                let key = field.unwrap_or_default().to_string();
                let thunk = PipelineThunk::new(
                    pipeline.clone(),
                    (*bound).clone(),
                    position.join_field(&key),
                );
                thunks.insert(key, thunk);
            }
            Ok(Some(value.to_json()))
        }
        ConfigValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let child = child_field(field, &index.to_string());
                out.push(render_value(item, context, Some(&child), renderer)?.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(out)))
        }
        ConfigValue::Object(fields) => {
            let mut out = Map::new();
            for (key, item) in fields {
                let child = child_field(field, key);
                if let Some(rendered) = render_value(item, context, Some(&child), renderer)? {
                    out.insert(key.clone(), rendered);
                }
            }
            Ok(Some(Value::Object(out)))
        }
    }
}

fn child_field(parent: Option<&str>, key: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}.{key}"),
        _ => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{BrickInvocation, Pipeline};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx(value: Value) -> BrickContext {
        BrickContext::from_value(value)
    }

    #[test]
    fn test_literal_is_unchanged() {
        let context = ctx(json!({"x": 42}));
        for literal in [json!(1.5), json!("{{ @x }}"), json!({"a": [true, null]}), json!(null)] {
            assert_eq!(resolve(&ConfigValue::Literal(literal.clone()), &context).unwrap(), literal);
        }
    }

    #[test]
    fn test_template_and_var_modes() {
        let context = ctx(json!({"x": 42}));

        assert_eq!(resolve(&ConfigValue::template("{{ @x }}"), &context).unwrap(), json!("42"));
        assert_eq!(resolve(&ConfigValue::var("@x"), &context).unwrap(), json!(42));
        assert_eq!(resolve(&ConfigValue::var("@missing"), &context).unwrap(), Value::Null);
        assert_eq!(resolve_optional(&ConfigValue::var("@missing"), &context).unwrap(), None);
    }

    #[test]
    fn test_structure_preserved() {
        let value = ConfigValue::from_wire(json!({
            "name": {"__type__": "var", "__value__": "@user.name"},
            "missing": {"__type__": "var", "__value__": "@nope"},
            "list": [{"__type__": "var", "__value__": "@nope"}, 2]
        }))
        .unwrap();

        let resolved = resolve(&value, &ctx(json!({"@user": {"name": "Ada"}}))).unwrap();
        assert_eq!(resolved, json!({"name": "Ada", "list": [null, 2]}));
    }

    #[test]
    fn test_error_carries_field_path() {
        let mut config = BTreeMap::new();
        config.insert(
            "body".to_string(),
            ConfigValue::from_wire(json!({"title": {"__type__": "nunjucks", "__value__": "{{ @x"}})).unwrap(),
        );

        let err = render_args(&config, &BrickContext::new(), &PositionPath::root().child_index(0)).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("config.body.title"));
        assert_eq!(err.expression, "{{ @x");
    }

    #[test]
    fn test_pipeline_fields_become_thunks() {
        let branch = Pipeline::new(vec![BrickInvocation::new("@brickflow/identity").with_instance_id("inner")]);
        let mut config = BTreeMap::new();
        config.insert("condition".to_string(), ConfigValue::literal(true));
        config.insert("if".to_string(), ConfigValue::pipeline(branch));

        let context = ctx(json!({"@input": 7}));
        let args = render_args(&config, &context, &PositionPath::root().child_index(0)).unwrap();

        let thunk = args.pipeline("if").unwrap();
        assert_eq!(thunk.position().to_string(), "0.if");
        assert_eq!(thunk.context().input(), Some(&json!(7)));
        assert_eq!(args.get("if").unwrap()["__type__"], "pipeline");
        assert_eq!(args.get("condition"), Some(&json!(true)));
    }

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!("No"), json!("off"), json!("F")] {
            assert!(!is_truthy(Some(&falsy)), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("yes"), json!([]), json!({})] {
            assert!(is_truthy(Some(&truthy)), "{truthy} should be truthy");
        }
        assert!(!is_truthy(None));
    }
}
