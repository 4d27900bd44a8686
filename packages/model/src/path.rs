//! # Patch paths
//!
//! A path addresses a location in the document value. Segments are array
//! indices, object field names, or key references (`{"_key": "..."}`).
//! Key references are preferred because they survive reordering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key reference segment, serialized as `{"_key": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyedSegment {
    #[serde(rename = "_key")]
    pub key: String,
}

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array index; negative values count from the end
    Index(isize),
    Field(String),
    Key(KeyedSegment),
}

impl PathSegment {
    pub fn key(key: impl Into<String>) -> Self {
        PathSegment::Key(KeyedSegment { key: key.into() })
    }

    pub fn field(name: impl Into<String>) -> Self {
        PathSegment::Field(name.into())
    }

    pub fn index(index: usize) -> Self {
        PathSegment::Index(index as isize)
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key(k) => Some(&k.key),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&str> {
        match self {
            PathSegment::Field(f) => Some(f),
            _ => None,
        }
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        PathSegment::Field(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        PathSegment::index(i)
    }
}

/// Sequence of segments from the document root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathSegment>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// `[{_key: block}]`
    pub fn block(block_key: &str) -> Self {
        Path(vec![PathSegment::key(block_key)])
    }

    /// `[{_key: block}, "children", {_key: child}]`
    pub fn child(block_key: &str, child_key: &str) -> Self {
        Path(vec![
            PathSegment::key(block_key),
            PathSegment::field("children"),
            PathSegment::key(child_key),
        ])
    }

    /// `[{_key: block}, "markDefs", {_key: def}]`
    pub fn mark_def(block_key: &str, def_key: &str) -> Self {
        Path(vec![
            PathSegment::key(block_key),
            PathSegment::field("markDefs"),
            PathSegment::key(def_key),
        ])
    }

    pub fn with(mut self, segment: impl Into<PathSegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn first(&self) -> Option<&PathSegment> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Path without its last segment
    pub fn parent(&self) -> Path {
        let mut segments = self.0.clone();
        segments.pop();
        Path(segments)
    }

    /// Key of the block the path points into, if addressed by key
    pub fn block_key(&self) -> Option<&str> {
        self.0.first().and_then(PathSegment::as_key)
    }

    /// Key of the child the path points into, for `[block, "children", child, ..]`
    pub fn child_key(&self) -> Option<&str> {
        match self.0.as_slice() {
            [_, PathSegment::Field(f), child, ..] if f == "children" => child.as_key(),
            _ => None,
        }
    }

    pub fn starts_with(&self, other: &Path) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Path(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
                PathSegment::Key(k) => write!(f, "[_key=={:?}]", k.key)?,
                PathSegment::Field(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
            }
        }
        Ok(())
    }
}
