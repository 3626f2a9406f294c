//! Variable paths such as `@profile.emails[0]` or `@input['first name']`.

use crate::context::BrickContext;
use crate::errors::TemplateError;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One step of a variable path after the root name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// An object key (or an array index written as a dotted number).
    Key(String),
    /// An array index written with brackets.
    Index(usize),
}

/// A parsed variable reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariablePath {
    root: String,
    segments: Vec<PathSegment>,
}

impl VariablePath {
    /// Parses a variable path.
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        input.parse()
    }

    /// Returns the root variable name without its `@` prefix.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns the segments following the root.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Looks the path up in `context`.
    ///
    /// A missing segment anywhere along the path yields `None`.
    #[must_use]
    pub fn lookup<'a>(&self, context: &'a BrickContext) -> Option<&'a Value> {
        let mut current = context.lookup(&self.root)?;
        for segment in &self.segments {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
                (PathSegment::Key(key), Value::Array(items)) => {
                    items.get(key.parse::<usize>().ok()?)?
                }
                (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
                (PathSegment::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-'
}

impl FromStr for VariablePath {
    type Err = TemplateError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| TemplateError::new(input, reason);
        let trimmed = input.trim();
        let body = trimmed.strip_prefix('@').unwrap_or(trimmed);

        let chars: Vec<char> = body.chars().collect();
        let mut position = 0;

        if chars.first().copied().map_or(true, |c| !is_ident_start(c)) {
            return Err(fail("variable name must start with a letter, '_' or '$'"));
        }
        while position < chars.len() && is_ident_char(chars[position]) {
            position += 1;
        }
        let root: String = chars[..position].iter().collect();

        let mut segments = Vec::new();
        while position < chars.len() {
            match chars[position] {
                '.' => {
                    position += 1;
                    let start = position;
                    while position < chars.len() && is_ident_char(chars[position]) {
                        position += 1;
                    }
                    if start == position {
                        return Err(fail("expected a key after '.'"));
                    }
                    segments.push(PathSegment::Key(chars[start..position].iter().collect()));
                }
                '[' => {
                    position += 1;
                    match chars.get(position) {
                        Some(&quote) if quote == '\'' || quote == '"' => {
                            position += 1;
                            let start = position;
                            while position < chars.len() && chars[position] != quote {
                                position += 1;
                            }
                            if position >= chars.len() {
                                return Err(fail("unterminated quoted key"));
                            }
                            let key: String = chars[start..position].iter().collect();
                            position += 1;
                            if chars.get(position) != Some(&']') {
                                return Err(fail("expected ']' after quoted key"));
                            }
                            position += 1;
                            segments.push(PathSegment::Key(key));
                        }
                        _ => {
                            let start = position;
                            while position < chars.len() && chars[position].is_ascii_digit() {
                                position += 1;
                            }
                            if start == position || chars.get(position) != Some(&']') {
                                return Err(fail("invalid index segment"));
                            }
                            let digits: String = chars[start..position].iter().collect();
                            let index = digits.parse().map_err(|_| fail("index out of range"))?;
                            position += 1;
                            segments.push(PathSegment::Index(index));
                        }
                    }
                }
                other => return Err(fail(&format!("unexpected character '{other}'"))),
            }
        }

        Ok(Self { root, segments })
    }
}

impl fmt::Display for VariablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.root)?;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) if key.chars().all(is_ident_char) && !key.is_empty() => {
                    write!(f, ".{key}")?;
                }
                PathSegment::Key(key) => write!(f, "['{key}']")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> BrickContext {
        BrickContext::from_value(json!({
            "@profile": {"name": "Ada", "emails": ["ada@example.com"], "first name": "A"},
            "@rows": [[1, 2], [3, 4]],
            "x": 42
        }))
    }

    #[test]
    fn test_parse_segments() {
        let path = VariablePath::parse("@profile.emails[0]").unwrap();
        assert_eq!(path.root(), "profile");
        assert_eq!(
            path.segments(),
            [PathSegment::Key("emails".into()), PathSegment::Index(0)]
        );
        assert_eq!(path.to_string(), "@profile.emails[0]");
    }

    #[test]
    fn test_lookup() {
        let ctx = context();
        let lookup = |s: &str| VariablePath::parse(s).unwrap().lookup(&ctx).cloned();

        assert_eq!(lookup("@profile.name"), Some(json!("Ada")));
        assert_eq!(lookup("@profile.emails[0]"), Some(json!("ada@example.com")));
        assert_eq!(lookup("@profile['first name']"), Some(json!("A")));
        assert_eq!(lookup("@rows.1.0"), Some(json!(3)));
        assert_eq!(lookup("@x"), Some(json!(42)));
        assert_eq!(lookup("@profile.missing.deeper"), None);
        assert_eq!(lookup("@nothing"), None);
    }

    #[test]
    fn test_malformed_paths() {
        for bad in ["@", "@1abc", "@a.", "@a[", "@a[x]", "@a['k'", "@a b"] {
            assert!(VariablePath::parse(bad).is_err(), "expected error for {bad}");
        }
    }
}
