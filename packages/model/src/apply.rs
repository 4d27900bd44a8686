//! # Patch application
//!
//! Pure application of an ordered patch list to a document value. Used for
//! offline reconstruction from a patch log and for verifying that translated
//! patches reproduce the editor state.
//!
//! A patch whose path cannot be resolved is skipped and reported; it never
//! aborts the rest of the batch.

use crate::dmp;
use crate::document::{document_from_json, document_to_json, Block, Document, Schema};
use crate::error::{ApplyError, DmpError, ModelResult};
use crate::patch::{InsertPosition, Patch};
use crate::path::{Path, PathSegment};
use serde_json::{Number, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A patch that was skipped
#[derive(Debug, Clone, PartialEq)]
pub struct PatchFailure {
    /// Position of the patch in the batch
    pub index: usize,
    pub patch: Patch,
    pub error: ApplyError,
}

/// Result of applying a batch to a JSON value
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub value: Option<Json>,
    pub failures: Vec<PatchFailure>,
}

/// Result of applying a batch to a typed document value
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub value: Option<Document>,
    pub failures: Vec<PatchFailure>,
}

fn array_index(items: &[Json], segment: &PathSegment) -> Option<usize> {
    match segment {
        PathSegment::Key(k) => items
            .iter()
            .position(|item| item.get("_key").and_then(Json::as_str) == Some(k.key.as_str())),
        PathSegment::Index(i) => {
            let len = items.len() as isize;
            let idx = if *i < 0 { len + i } else { *i };
            (0..len).contains(&idx).then_some(idx as usize)
        }
        PathSegment::Field(_) => None,
    }
}

fn resolve_mut<'a>(mut node: &'a mut Json, segments: &[PathSegment]) -> Option<&'a mut Json> {
    for segment in segments {
        node = match node {
            Json::Array(items) => {
                let idx = array_index(items, segment)?;
                &mut items[idx]
            }
            Json::Object(map) => match segment {
                PathSegment::Field(f) => map.get_mut(f)?,
                _ => return None,
            },
            _ => return None,
        };
    }
    Some(node)
}

/// Read-only lookup of the value at `path`
pub fn resolve<'a>(root: &'a Json, path: &Path) -> Option<&'a Json> {
    let mut node = root;
    for segment in path.segments() {
        node = match node {
            Json::Array(items) => &items[array_index(items, segment)?],
            Json::Object(map) => match segment {
                PathSegment::Field(f) => map.get(f)?,
                _ => return None,
            },
            _ => return None,
        };
    }
    Some(node)
}

/// Split a non-root path into the parent container and the final segment
fn parent_and_last<'a>(
    root: &'a mut Json,
    path: &Path,
) -> Result<(&'a mut Json, PathSegment), ApplyError> {
    let segments = path.segments();
    let (last, parent_segments) = segments
        .split_last()
        .ok_or_else(|| ApplyError::PathNotFound(path.to_string()))?;
    let parent =
        resolve_mut(root, parent_segments).ok_or_else(|| ApplyError::PathNotFound(path.parent().to_string()))?;
    Ok((parent, last.clone()))
}

fn not_found(path: &Path) -> ApplyError {
    ApplyError::PathNotFound(path.to_string())
}

fn add_number(current: &Json, amount: f64, path: &Path) -> Result<Json, ApplyError> {
    let Json::Number(n) = current else {
        return Err(ApplyError::NotANumber(path.to_string()));
    };
    if let (Some(i), true) = (n.as_i64(), amount.fract() == 0.0) {
        return Ok(Json::from(i + amount as i64));
    }
    let sum = n.as_f64().unwrap_or_default() + amount;
    Number::from_f64(sum)
        .map(Json::Number)
        .ok_or_else(|| ApplyError::NotANumber(path.to_string()))
}

/// Apply one patch in place
pub fn apply_patch(value: &mut Option<Json>, patch: &Patch) -> Result<(), ApplyError> {
    let path = patch.path();

    if path.is_root() {
        match patch {
            Patch::Set { value: v, .. } => *value = Some(v.clone()),
            Patch::SetIfMissing { value: v, .. } => {
                if value.is_none() {
                    *value = Some(v.clone());
                }
            }
            Patch::Unset { .. } => *value = None,
            Patch::Insert { position, items, .. } => match value {
                None => *value = Some(Json::Array(items.clone())),
                Some(Json::Array(existing)) => match position {
                    InsertPosition::Before => {
                        existing.splice(0..0, items.iter().cloned());
                    }
                    InsertPosition::After => existing.extend(items.iter().cloned()),
                },
                Some(_) => return Err(ApplyError::NotAnArray(path.to_string())),
            },
            Patch::DiffMatchPatch { .. } | Patch::Inc { .. } | Patch::Dec { .. } => {
                return Err(ApplyError::InvalidRoot(patch.to_string()))
            }
        }
        return Ok(());
    }

    let root = value
        .as_mut()
        .ok_or_else(|| ApplyError::InvalidRoot(patch.to_string()))?;

    match patch {
        Patch::SetIfMissing { value: v, .. } => {
            let (parent, last) = parent_and_last(root, path)?;
            match (parent, &last) {
                (Json::Object(map), PathSegment::Field(f)) => {
                    map.entry(f.clone()).or_insert_with(|| v.clone());
                    Ok(())
                }
                (Json::Array(items), segment) => array_index(items, segment).map(|_| ()).ok_or_else(|| not_found(path)),
                _ => Err(not_found(path)),
            }
        }
        Patch::Set { value: v, .. } => {
            let (parent, last) = parent_and_last(root, path)?;
            match (parent, &last) {
                (Json::Object(map), PathSegment::Field(f)) => {
                    map.insert(f.clone(), v.clone());
                    Ok(())
                }
                (Json::Array(items), segment) => {
                    let idx = array_index(items, segment).ok_or_else(|| not_found(path))?;
                    items[idx] = v.clone();
                    Ok(())
                }
                _ => Err(not_found(path)),
            }
        }
        Patch::Unset { .. } => {
            let (parent, last) = parent_and_last(root, path)?;
            match (parent, &last) {
                (Json::Object(map), PathSegment::Field(f)) => map.remove(f).map(|_| ()).ok_or_else(|| not_found(path)),
                (Json::Array(items), segment) => {
                    let idx = array_index(items, segment).ok_or_else(|| not_found(path))?;
                    items.remove(idx);
                    Ok(())
                }
                _ => Err(not_found(path)),
            }
        }
        Patch::Insert { position, items: new_items, .. } => {
            let (parent, last) = parent_and_last(root, path)?;
            match (parent, &last) {
                (Json::Object(map), PathSegment::Field(f)) => {
                    let Some(Json::Array(target)) = map.get_mut(f) else {
                        return Err(ApplyError::NotAnArray(path.to_string()));
                    };
                    let at = match position {
                        InsertPosition::Before => 0,
                        InsertPosition::After => target.len(),
                    };
                    target.splice(at..at, new_items.iter().cloned());
                    Ok(())
                }
                (Json::Array(items), segment) => {
                    let at = match (array_index(items, segment), segment, position) {
                        (Some(idx), _, InsertPosition::Before) => idx,
                        (Some(idx), _, InsertPosition::After) => idx + 1,
                        // Index one past the end addresses the end of the array
                        (None, PathSegment::Index(i), _) if *i >= 0 && *i as usize == items.len() => items.len(),
                        _ => return Err(not_found(path)),
                    };
                    items.splice(at..at, new_items.iter().cloned());
                    Ok(())
                }
                _ => Err(ApplyError::NotAnArray(path.to_string())),
            }
        }
        Patch::DiffMatchPatch { value: patch_text, .. } => {
            let target = resolve_mut(root, path.segments()).ok_or_else(|| not_found(path))?;
            let Json::String(text) = target else {
                return Err(ApplyError::NotAString(path.to_string()));
            };
            let updated = dmp::apply_patch_text(patch_text, text).map_err(|source: DmpError| {
                ApplyError::TextMismatch {
                    path: path.to_string(),
                    source,
                }
            })?;
            *text = updated;
            Ok(())
        }
        Patch::Inc { value: amount, .. } | Patch::Dec { value: amount, .. } => {
            let amount = if matches!(patch, Patch::Dec { .. }) { -amount } else { *amount };
            let target = resolve_mut(root, path.segments()).ok_or_else(|| not_found(path))?;
            *target = add_number(target, amount, path)?;
            Ok(())
        }
    }
}

/// Apply patches in order to a JSON value
pub fn apply_all_json(value: Option<Json>, patches: &[Patch]) -> ApplyOutcome {
    let mut value = value;
    let mut failures = Vec::new();

    for (index, patch) in patches.iter().enumerate() {
        if let Err(error) = apply_patch(&mut value, patch) {
            warn!(index, patch = %patch, error = %error, "Skipping patch that does not resolve");
            failures.push(PatchFailure {
                index,
                patch: patch.clone(),
                error,
            });
        }
    }

    debug!(patches = patches.len(), failures = failures.len(), "Applied patch batch");
    ApplyOutcome { value, failures }
}

/// Apply patches to a typed document value.
///
/// Blocks that come out deeply equal to a block of the input keep the
/// input's `Arc`, so unchanged blocks stay reference-equal.
pub fn apply_all(value: Option<&[Arc<Block>]>, patches: &[Patch], schema: &Schema) -> ModelResult<DocumentOutcome> {
    let outcome = apply_all_json(value.map(document_to_json), patches);

    let document = match outcome.value {
        None => None,
        Some(json) => {
            let parsed = document_from_json(json, schema)?;
            let previous: HashMap<&str, &Arc<Block>> = value
                .unwrap_or_default()
                .iter()
                .map(|b| (b.key(), b))
                .collect();
            Some(
                parsed
                    .into_iter()
                    .map(|block| match previous.get(block.key()) {
                        Some(prev) if ***prev == *block => Arc::clone(prev),
                        _ => block,
                    })
                    .collect(),
            )
        }
    };

    Ok(DocumentOutcome {
        value: document,
        failures: outcome.failures,
    })
}
