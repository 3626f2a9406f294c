//! Position paths locating an invocation inside a pipeline tree.
//!
//! The executor and the pipeline visitor derive positions the same way:
//! the top-level invocation at index `i` is `i`, and an invocation at index
//! `j` of the pipeline in field `f` of invocation `p` is `p.f.j`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One segment of a position path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PositionSegment {
    /// An index into a pipeline or array.
    Index(usize),
    /// A configuration field name.
    Field(String),
}

/// The location of an invocation (or field) within a pipeline tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionPath {
    segments: Vec<PositionSegment>,
}

impl PositionPath {
    /// Returns the empty path of the top-level pipeline.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns this path extended with an index.
    #[must_use]
    pub fn child_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PositionSegment::Index(index));
        Self { segments }
    }

    /// Returns this path extended with a single field segment.
    ///
    /// All-digit names become index segments.
    #[must_use]
    pub fn child_field(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment_for(name));
        Self { segments }
    }

    /// Returns this path extended with a dotted field path.
    #[must_use]
    pub fn join_field(&self, dotted: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(dotted.split('.').filter(|part| !part.is_empty()).map(segment_for));
        Self { segments }
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[PositionSegment] {
        &self.segments
    }

    /// Returns true for the top-level pipeline path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the number of pipelines this path descends through.
    #[must_use]
    pub fn nesting_depth(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, PositionSegment::Field(_)))
            .count()
    }
}

fn segment_for(name: &str) -> PositionSegment {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(index) = name.parse() {
            return PositionSegment::Index(index);
        }
    }
    PositionSegment::Field(name.to_string())
}

impl fmt::Display for PositionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                PositionSegment::Index(index) => write!(f, "{index}")?,
                PositionSegment::Field(name) => f.write_str(name)?,
            }
        }
        Ok(())
    }
}

impl FromStr for PositionPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::root().join_field(s))
    }
}

impl Serialize for PositionPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PositionPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::root().join_field(&raw))
    }
}

/// A loop or retry frame distinguishing repeated runs of the same branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchFrame {
    /// The branch field (e.g. `body`).
    pub key: String,
    /// The iteration or attempt counter.
    pub counter: usize,
}

impl BranchFrame {
    /// Creates a branch frame.
    #[must_use]
    pub fn new(key: impl Into<String>, counter: usize) -> Self {
        Self {
            key: key.into(),
            counter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let path = PositionPath::root().child_index(0).child_field("if").child_index(0);
        assert_eq!(path.to_string(), "0.if.0");
        assert_eq!(PositionPath::root().to_string(), "");
        assert_eq!(path.nesting_depth(), 1);
    }

    #[test]
    fn test_join_field_splits_indexes() {
        let path = PositionPath::root().child_index(2).join_field("branches.1");
        assert_eq!(
            path.segments(),
            [
                PositionSegment::Index(2),
                PositionSegment::Field("branches".into()),
                PositionSegment::Index(1)
            ]
        );
    }

    #[test]
    fn test_parse_and_serde() {
        let path: PositionPath = "0.body.3".parse().unwrap();
        assert_eq!(path, PositionPath::root().child_index(0).child_field("body").child_index(3));

        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"0.body.3\"");
        let back: PositionPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
