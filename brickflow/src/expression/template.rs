//! A restricted templating dialect.
//!
//! Templates interpolate `{{ expression | filter }}` segments into text.
//! Expressions are variable paths or quoted/numeric literals. Block tags
//! (`{% ... %}`) are not supported and rendering never performs I/O.

use super::path::VariablePath;
use crate::context::BrickContext;
use crate::errors::TemplateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The template dialect a template expression is written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateEngine {
    /// Nunjucks-style interpolation with filters.
    #[default]
    Nunjucks,
    /// Handlebars-style interpolation with filters.
    Handlebars,
    /// Plain mustache interpolation without filters.
    Mustache,
}

impl TemplateEngine {
    /// Returns the wire name of the engine.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nunjucks => "nunjucks",
            Self::Handlebars => "handlebars",
            Self::Mustache => "mustache",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "nunjucks" => Some(Self::Nunjucks),
            "handlebars" => Some(Self::Handlebars),
            "mustache" => Some(Self::Mustache),
            _ => None,
        }
    }

    fn supports_filters(self) -> bool {
        !matches!(self, Self::Mustache)
    }
}

impl fmt::Display for TemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subject of an interpolation.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Variable(VariablePath),
    Literal(Value),
}

/// A filter applied to an interpolated value.
#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Upper,
    Lower,
    Trim,
    Capitalize,
    Length,
    Json,
    Join(String),
    Default(Value),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Interpolation { operand: Operand, filters: Vec<Filter> },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    engine: TemplateEngine,
    segments: Vec<Segment>,
}

impl Template {
    /// Parses `source` in the given dialect.
    pub fn parse(engine: TemplateEngine, source: &str) -> Result<Self, TemplateError> {
        if source.contains("{%") {
            return Err(TemplateError::new(source, "block tags are not supported"));
        }

        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| TemplateError::new(source, "unclosed interpolation"))?;
            segments.push(parse_interpolation(engine, source, &after[..end])?);
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self { engine, segments })
    }

    /// Returns the dialect of this template.
    #[must_use]
    pub fn engine(&self) -> TemplateEngine {
        self.engine
    }

    /// Returns every variable path the template references.
    #[must_use]
    pub fn variables(&self) -> Vec<&VariablePath> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Interpolation {
                    operand: Operand::Variable(path),
                    ..
                } => Some(path),
                _ => None,
            })
            .collect()
    }

    /// Renders the template against `context`.
    ///
    /// Undefined values render as the empty string.
    #[must_use]
    pub fn render(&self, context: &BrickContext) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Interpolation { operand, filters } => {
                    let value = match operand {
                        Operand::Variable(path) => path.lookup(context).cloned(),
                        Operand::Literal(value) => Some(value.clone()),
                    };
                    let value = filters.iter().fold(value, |acc, filter| filter.apply(acc));
                    out.push_str(&stringify(value.as_ref()));
                }
            }
        }
        out
    }
}

/// Renders `value` the way an interpolation prints it.
#[must_use]
pub fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn parse_interpolation(
    engine: TemplateEngine,
    source: &str,
    body: &str,
) -> Result<Segment, TemplateError> {
    let parts = split_outside_quotes(body, '|');
    let (head, filter_parts) = parts
        .split_first()
        .ok_or_else(|| TemplateError::new(source, "empty interpolation"))?;

    let head = head.trim();
    if head.is_empty() {
        return Err(TemplateError::new(source, "empty interpolation"));
    }
    if !filter_parts.is_empty() && !engine.supports_filters() {
        return Err(TemplateError::new(
            source,
            format!("filters are not supported by the {engine} engine"),
        ));
    }

    let operand = parse_operand(source, head)?;
    let filters = filter_parts
        .iter()
        .map(|part| parse_filter(source, part.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Segment::Interpolation { operand, filters })
}

fn parse_operand(source: &str, text: &str) -> Result<Operand, TemplateError> {
    if let Some(value) = parse_literal(text) {
        return Ok(Operand::Literal(value));
    }
    VariablePath::parse(text)
        .map(Operand::Variable)
        .map_err(|err| TemplateError::new(source, err.reason))
}

fn parse_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return Some(Value::String(text[1..text.len() - 1].to_string()));
        }
    }
    match text {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" | "none" => return Some(Value::Null),
        _ => {}
    }
    if text.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        return serde_json::from_str::<serde_json::Number>(text)
            .ok()
            .map(Value::Number);
    }
    None
}

fn parse_filter(source: &str, text: &str) -> Result<Filter, TemplateError> {
    let (name, arg) = match text.find('(') {
        Some(open) => {
            let close = text
                .rfind(')')
                .filter(|close| *close > open)
                .ok_or_else(|| TemplateError::new(source, format!("unclosed filter arguments in '{text}'")))?;
            (text[..open].trim(), Some(text[open + 1..close].trim()))
        }
        None => (text, None),
    };
    let literal_arg = |default: Value| -> Result<Value, TemplateError> {
        match arg {
            None | Some("") => Ok(default),
            Some(raw) => parse_literal(raw).ok_or_else(|| {
                TemplateError::new(source, format!("filter '{name}' expects a literal argument"))
            }),
        }
    };

    let filter = match name {
        "upper" => Filter::Upper,
        "lower" => Filter::Lower,
        "trim" => Filter::Trim,
        "capitalize" => Filter::Capitalize,
        "length" => Filter::Length,
        "json" | "dump" => Filter::Json,
        "join" => Filter::Join(stringify(Some(&literal_arg(Value::String(",".into()))?))),
        "default" | "d" => Filter::Default(literal_arg(Value::String(String::new()))?),
        "" => return Err(TemplateError::new(source, "empty filter name")),
        other => return Err(TemplateError::new(source, format!("unknown filter '{other}'"))),
    };
    Ok(filter)
}

fn split_outside_quotes(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (index, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == separator => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            None => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

impl Filter {
    fn apply(&self, value: Option<Value>) -> Option<Value> {
        let text = || stringify(value.as_ref());
        match self {
            Self::Upper => Some(Value::String(text().to_uppercase())),
            Self::Lower => Some(Value::String(text().to_lowercase())),
            Self::Trim => Some(Value::String(text().trim().to_string())),
            Self::Capitalize => {
                let lower = text().to_lowercase();
                let mut chars = lower.chars();
                let capitalized = chars
                    .next()
                    .map(|first| first.to_uppercase().chain(chars).collect())
                    .unwrap_or_default();
                Some(Value::String(capitalized))
            }
            Self::Length => {
                let len = match &value {
                    Some(Value::Array(items)) => items.len(),
                    Some(Value::Object(map)) => map.len(),
                    Some(Value::String(s)) => s.chars().count(),
                    _ => 0,
                };
                Some(Value::from(len))
            }
            Self::Json => value.map(|v| Value::String(v.to_string())),
            Self::Join(separator) => match &value {
                Some(Value::Array(items)) => Some(Value::String(
                    items
                        .iter()
                        .map(|item| stringify(Some(item)))
                        .collect::<Vec<_>>()
                        .join(separator),
                )),
                _ => value,
            },
            Self::Default(fallback) => match value {
                None | Some(Value::Null) => Some(fallback.clone()),
                present => present,
            },
        }
    }
}
