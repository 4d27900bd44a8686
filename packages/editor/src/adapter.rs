//! # Patch → operation adapter
//!
//! Turns patches authored elsewhere into editor operations. Common shapes
//! (block and child insert/unset, span text edits, whole-document patches)
//! map to precise operations; anything else is applied to the JSON form of
//! the addressed block and the block is replaced.
//!
//! While the session throttles a local edit burst, patches are not applied
//! to the tree. [`adjust_selection`] instead moves the selection the way the
//! patch will move the content once it lands.

use crate::convert::{block_json, block_to_internal, inline_to_internal};
use crate::errors::{OperationError, OperationResult};
use crate::node::{placeholder_block, EditorBlock, Node, Point, Range, TextElement};
use crate::operations::Operation;
use crate::translate::document_json;
use folio_model::dmp;
use folio_model::{
    apply_patch, document_from_json, ApplyError, Block, Child, InsertPosition, KeyGenerator, Patch, PathSegment,
    Schema,
};
use serde_json::Value as Json;
use std::sync::Arc;

/// How a remote patch moved content, in indices of the tree it was applied to
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEffect {
    BlocksInserted {
        index: usize,
        count: usize,
    },
    BlockRemoved {
        index: usize,
    },
    ChildrenInserted {
        block: usize,
        index: usize,
        count: usize,
    },
    ChildRemoved {
        block: usize,
        index: usize,
    },
    TextChanged {
        block: usize,
        child: usize,
        change_start: usize,
        delta: isize,
    },
    /// The whole value was cleared or replaced
    DocumentReplaced,
    /// Nothing that moves positions
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Adapted {
    pub operations: Vec<Operation>,
    pub effect: RemoteEffect,
}

impl Adapted {
    fn none() -> Self {
        Self {
            operations: Vec::new(),
            effect: RemoteEffect::Opaque,
        }
    }
}

fn array_index<T>(items: &[T], key_of: impl Fn(&T) -> &str, segment: &PathSegment) -> Option<usize> {
    match segment {
        PathSegment::Key(k) => items.iter().position(|item| key_of(item) == k.key),
        PathSegment::Index(i) => {
            let len = items.len() as isize;
            let idx = if *i < 0 { len + i } else { *i };
            (0..len).contains(&idx).then_some(idx as usize)
        }
        PathSegment::Field(_) => None,
    }
}

fn block_index(tree: &[Arc<EditorBlock>], segment: &PathSegment) -> Option<usize> {
    array_index(tree, |b| b.key(), segment)
}

fn child_index(element: &TextElement, segment: &PathSegment) -> Option<usize> {
    array_index(&element.children, |c| c.key(), segment)
}

/// Index an `insert` lands at relative to `segment`; one past the end is allowed
fn insert_index(len: usize, found: Option<usize>, segment: &PathSegment, position: InsertPosition) -> Option<usize> {
    match (found, position) {
        (Some(i), InsertPosition::Before) => Some(i),
        (Some(i), InsertPosition::After) => Some(i + 1),
        (None, _) => match segment {
            PathSegment::Index(i) if *i >= 0 && *i as usize == len => Some(len),
            _ => None,
        },
    }
}

fn not_found(patch: &Patch) -> OperationError {
    OperationError::Unresolved(ApplyError::PathNotFound(patch.path().to_string()))
}

fn is_field(segment: &PathSegment, name: &str) -> bool {
    segment.as_field() == Some(name)
}

/// Operations that replace the whole tree with `blocks`
fn replace_all(tree: &[Arc<EditorBlock>], blocks: Vec<EditorBlock>) -> Vec<Operation> {
    let removals = (0..tree.len()).rev().map(|i| Operation::RemoveNode {
        path: vec![i],
        node: Node::Block(tree[i].as_ref().clone()),
    });
    let inserts = blocks.into_iter().enumerate().map(|(i, block)| Operation::InsertNode {
        path: vec![i],
        node: Node::Block(block),
    });
    removals.chain(inserts).collect()
}

fn placeholder(schema: &Schema, keys: &mut KeyGenerator) -> EditorBlock {
    placeholder_block(keys.new_key(), keys.new_key(), schema)
}

/// Derive the operations that bring `tree` in line with `patch`
pub fn adapt(
    patch: &Patch,
    tree: &[Arc<EditorBlock>],
    schema: &Schema,
    keys: &mut KeyGenerator,
) -> OperationResult<Adapted> {
    let segments = patch.path().segments();
    match (patch, segments) {
        (_, []) => adapt_root(patch, tree, schema, keys),

        (Patch::Insert { position, items, .. }, [segment]) => {
            let at = insert_index(tree.len(), block_index(tree, segment), segment, *position)
                .ok_or_else(|| not_found(patch))?;
            let operations = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let block = Block::from_json(item.clone(), schema, at + i)?;
                    Ok(Operation::InsertNode {
                        path: vec![at + i],
                        node: Node::Block(block_to_internal(&block)),
                    })
                })
                .collect::<OperationResult<Vec<_>>>()?;
            Ok(Adapted {
                operations,
                effect: RemoteEffect::BlocksInserted {
                    index: at,
                    count: items.len(),
                },
            })
        }

        (Patch::Unset { .. }, [segment]) => {
            let index = block_index(tree, segment).ok_or_else(|| not_found(patch))?;
            let mut operations = vec![Operation::RemoveNode {
                path: vec![index],
                node: Node::Block(tree[index].as_ref().clone()),
            }];
            if tree.len() == 1 {
                operations.push(Operation::InsertNode {
                    path: vec![0],
                    node: Node::Block(placeholder(schema, keys)),
                });
            }
            Ok(Adapted {
                operations,
                effect: RemoteEffect::BlockRemoved { index },
            })
        }

        (Patch::Insert { position, items, .. }, [segment, children]) if is_field(children, "children") => {
            let block = block_index(tree, segment).ok_or_else(|| not_found(patch))?;
            let element = tree[block].as_text().ok_or_else(|| not_found(patch))?;
            let at = match position {
                InsertPosition::Before => 0,
                InsertPosition::After => element.children.len(),
            };
            child_inserts(element, block, at, items, schema)
        }

        (Patch::Insert { position, items, .. }, [segment, children, child]) if is_field(children, "children") => {
            let block = block_index(tree, segment).ok_or_else(|| not_found(patch))?;
            let element = tree[block].as_text().ok_or_else(|| not_found(patch))?;
            let at = insert_index(element.children.len(), child_index(element, child), child, *position)
                .ok_or_else(|| not_found(patch))?;
            child_inserts(element, block, at, items, schema)
        }

        (Patch::Unset { .. }, [segment, children, child]) if is_field(children, "children") => {
            let block = block_index(tree, segment).ok_or_else(|| not_found(patch))?;
            let element = tree[block].as_text().ok_or_else(|| not_found(patch))?;
            let index = child_index(element, child).ok_or_else(|| not_found(patch))?;
            Ok(Adapted {
                operations: vec![Operation::RemoveNode {
                    path: vec![block, index],
                    node: Node::Inline(element.children[index].clone()),
                }],
                effect: RemoteEffect::ChildRemoved { block, index },
            })
        }

        (Patch::Set { value: Json::String(_), .. } | Patch::DiffMatchPatch { .. }, [segment, children, child, text])
            if is_field(children, "children") && is_field(text, "text") =>
        {
            let block = block_index(tree, segment).ok_or_else(|| not_found(patch))?;
            let element = tree[block].as_text().ok_or_else(|| not_found(patch))?;
            let index = child_index(element, child).ok_or_else(|| not_found(patch))?;
            match element.children[index].as_text() {
                Some(leaf) => adapt_text(patch, &leaf.text, block, index),
                None => adapt_block(patch, tree, block, schema),
            }
        }

        (_, [segment, ..]) => {
            let block = block_index(tree, segment).ok_or_else(|| not_found(patch))?;
            adapt_block(patch, tree, block, schema)
        }
    }
}

fn child_inserts(
    element: &TextElement,
    block: usize,
    at: usize,
    items: &[Json],
    schema: &Schema,
) -> OperationResult<Adapted> {
    let operations = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let child = Child::from_json(item.clone(), schema, &element.key, at + i)?;
            Ok(Operation::InsertNode {
                path: vec![block, at + i],
                node: Node::Inline(inline_to_internal(&child)),
            })
        })
        .collect::<OperationResult<Vec<_>>>()?;
    Ok(Adapted {
        operations,
        effect: RemoteEffect::ChildrenInserted {
            block,
            index: at,
            count: items.len(),
        },
    })
}

fn adapt_text(patch: &Patch, current: &str, block: usize, child: usize) -> OperationResult<Adapted> {
    let updated = match patch {
        Patch::Set {
            value: Json::String(text),
            ..
        } => text.clone(),
        Patch::DiffMatchPatch { value, .. } => {
            dmp::apply_patch_text(value, current).map_err(|source| ApplyError::TextMismatch {
                path: patch.path().to_string(),
                source,
            })?
        }
        _ => return Err(not_found(patch)),
    };
    if updated == current {
        return Ok(Adapted::none());
    }

    let path = vec![block, child];
    let mut offset = 0;
    let mut change_start = None;
    let mut operations = Vec::new();
    for diff in dmp::diff_main(current, &updated) {
        match diff {
            dmp::Diff::Equal(text) => offset += text.chars().count(),
            dmp::Diff::Delete(text) => {
                change_start.get_or_insert(offset);
                operations.push(Operation::RemoveText {
                    path: path.clone(),
                    offset,
                    text,
                });
            }
            dmp::Diff::Insert(text) => {
                change_start.get_or_insert(offset);
                let len = text.chars().count();
                operations.push(Operation::InsertText {
                    path: path.clone(),
                    offset,
                    text,
                });
                offset += len;
            }
        }
    }

    Ok(Adapted {
        operations,
        effect: RemoteEffect::TextChanged {
            block,
            child,
            change_start: change_start.unwrap_or(offset),
            delta: updated.chars().count() as isize - current.chars().count() as isize,
        },
    })
}

/// Apply the patch to the JSON form of one block and replace the block
fn adapt_block(patch: &Patch, tree: &[Arc<EditorBlock>], index: usize, schema: &Schema) -> OperationResult<Adapted> {
    let current = tree[index].as_ref();
    let mut value = Some(block_json(current, schema)?);
    let mut relative = patch.clone();
    relative.path_mut().0.remove(0);
    apply_patch(&mut value, &relative)?;

    let Some(json) = value else {
        return Ok(Adapted {
            operations: vec![Operation::RemoveNode {
                path: vec![index],
                node: Node::Block(current.clone()),
            }],
            effect: RemoteEffect::BlockRemoved { index },
        });
    };

    let replacement = block_to_internal(&Block::from_json(json, schema, index)?);
    if &replacement == current {
        return Ok(Adapted::none());
    }
    Ok(Adapted {
        operations: vec![
            Operation::RemoveNode {
                path: vec![index],
                node: Node::Block(current.clone()),
            },
            Operation::InsertNode {
                path: vec![index],
                node: Node::Block(replacement),
            },
        ],
        effect: RemoteEffect::Opaque,
    })
}

fn adapt_root(
    patch: &Patch,
    tree: &[Arc<EditorBlock>],
    schema: &Schema,
    keys: &mut KeyGenerator,
) -> OperationResult<Adapted> {
    let current = document_json(tree, schema).map_err(|_| not_found(patch))?;
    let was_empty = current.is_none();
    let mut value = current;
    apply_patch(&mut value, patch)?;

    let document = match value {
        Some(json) => document_from_json(json, schema)?,
        None => Vec::new(),
    };
    let blocks: Vec<EditorBlock> = if document.is_empty() {
        if was_empty {
            return Ok(Adapted::none());
        }
        vec![placeholder(schema, keys)]
    } else {
        document.iter().map(|b| block_to_internal(b)).collect()
    };

    let unchanged = blocks.len() == tree.len() && blocks.iter().zip(tree).all(|(new, old)| new == old.as_ref());
    if unchanged {
        return Ok(Adapted::none());
    }
    Ok(Adapted {
        operations: replace_all(tree, blocks),
        effect: RemoteEffect::DocumentReplaced,
    })
}

/// Move a selection the way `patch` will move content once it is applied
pub fn adjust_selection(range: &Range, patch: &Patch, tree: &[Arc<EditorBlock>]) -> Range {
    Range::new(
        adjust_point(&range.anchor, patch, tree),
        adjust_point(&range.focus, patch, tree),
    )
}

fn adjust_point(point: &Point, patch: &Patch, tree: &[Arc<EditorBlock>]) -> Point {
    let (b, c, o) = (point.block(), point.child(), point.offset);
    match (patch, patch.path().segments()) {
        (Patch::Insert { position, items, .. }, [segment]) => {
            match insert_index(tree.len(), block_index(tree, segment), segment, *position) {
                Some(at) if at <= b => Point::new(b + items.len(), c, o),
                _ => point.clone(),
            }
        }

        (Patch::Unset { .. }, [segment]) => match block_index(tree, segment) {
            Some(index) if index < b => Point::new(b - 1, c, o),
            _ => point.clone(),
        },

        (Patch::DiffMatchPatch { value, .. }, [segment, children, child, text])
            if is_field(children, "children") && is_field(text, "text") =>
        {
            let same_leaf = block_index(tree, segment) == Some(b)
                && tree[b].as_text().and_then(|e| child_index(e, child)) == Some(c);
            let Ok(hunks) = dmp::parse_patches(value) else {
                return point.clone();
            };
            if !same_leaf {
                return point.clone();
            }
            let mut offset = o;
            for hunk in hunks {
                let start = hunk.change_start();
                if start <= offset {
                    offset = (offset as isize + hunk.length_delta()).max(start as isize) as usize;
                }
            }
            Point::new(b, c, offset)
        }

        (Patch::Unset { .. }, [segment, children, child]) if is_field(children, "children") => {
            if block_index(tree, segment) != Some(b) {
                return point.clone();
            }
            let Some(element) = tree[b].as_text() else {
                return point.clone();
            };
            match child_index(element, child) {
                Some(index) if index == c && index > 0 => {
                    Point::new(b, index - 1, element.children[index - 1].text_len())
                }
                Some(index) if index == c => Point::new(b, 0, 0),
                Some(index) if index < c => Point::new(b, c - 1, o),
                _ => point.clone(),
            }
        }

        _ => point.clone(),
    }
}
