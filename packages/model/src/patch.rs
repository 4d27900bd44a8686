//! # Patches
//!
//! Wire format for edits exchanged with consumers of the document value.
//!
//! ```text
//! {type: "set", path: [{_key: "a"}, "children", {_key: "s1"}, "text"], value: "Hello"}
//! {type: "insert", path: [{_key: "a"}], position: "after", items: [...]}
//! {type: "unset", path: []}
//! ```

use crate::path::{Path, PathSegment};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;

/// Where `insert` places its items relative to the addressed element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Before,
    After,
}

/// A single addressable edit instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Patch {
    SetIfMissing { path: Path, value: Json },
    Set { path: Path, value: Json },
    Unset { path: Path },
    Insert {
        path: Path,
        position: InsertPosition,
        items: Vec<Json>,
    },
    /// `value` holds the textual diff in diff-match-patch patch format
    DiffMatchPatch { path: Path, value: String },
    Inc { path: Path, value: f64 },
    Dec { path: Path, value: f64 },
}

impl Patch {
    pub fn path(&self) -> &Path {
        match self {
            Patch::SetIfMissing { path, .. }
            | Patch::Set { path, .. }
            | Patch::Unset { path }
            | Patch::Insert { path, .. }
            | Patch::DiffMatchPatch { path, .. }
            | Patch::Inc { path, .. }
            | Patch::Dec { path, .. } => path,
        }
    }

    pub fn path_mut(&mut self) -> &mut Path {
        match self {
            Patch::SetIfMissing { path, .. }
            | Patch::Set { path, .. }
            | Patch::Unset { path }
            | Patch::Insert { path, .. }
            | Patch::DiffMatchPatch { path, .. }
            | Patch::Inc { path, .. }
            | Patch::Dec { path, .. } => path,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Patch::SetIfMissing { .. } => "setIfMissing",
            Patch::Set { .. } => "set",
            Patch::Unset { .. } => "unset",
            Patch::Insert { .. } => "insert",
            Patch::DiffMatchPatch { .. } => "diffMatchPatch",
            Patch::Inc { .. } => "inc",
            Patch::Dec { .. } => "dec",
        }
    }

    /// `unset([])`: the whole document value is cleared
    pub fn is_document_unset(&self) -> bool {
        matches!(self, Patch::Unset { path } if path.is_root())
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.path())
    }
}

pub fn set(value: impl Into<Json>, path: impl Into<Path>) -> Patch {
    Patch::Set {
        path: path.into(),
        value: value.into(),
    }
}

pub fn set_if_missing(value: impl Into<Json>, path: impl Into<Path>) -> Patch {
    Patch::SetIfMissing {
        path: path.into(),
        value: value.into(),
    }
}

pub fn unset(path: impl Into<Path>) -> Patch {
    Patch::Unset { path: path.into() }
}

pub fn insert(items: Vec<Json>, position: InsertPosition, path: impl Into<Path>) -> Patch {
    Patch::Insert {
        path: path.into(),
        position,
        items,
    }
}

pub fn diff_match_patch(patch_text: impl Into<String>, path: impl Into<Path>) -> Patch {
    Patch::DiffMatchPatch {
        path: path.into(),
        value: patch_text.into(),
    }
}

pub fn inc(amount: f64, path: impl Into<Path>) -> Patch {
    Patch::Inc {
        path: path.into(),
        value: amount,
    }
}

pub fn dec(amount: f64, path: impl Into<Path>) -> Patch {
    Patch::Dec {
        path: path.into(),
        value: amount,
    }
}

/// Re-root a patch under `segment`
pub fn prefix_path(mut patch: Patch, segment: PathSegment) -> Patch {
    let path = patch.path_mut();
    path.0.insert(0, segment);
    patch
}
