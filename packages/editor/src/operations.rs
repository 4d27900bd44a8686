//! # Operations
//!
//! Low-level edits on the editor tree. Every operation carries enough data to
//! produce its exact inverse, which is what the history replays on undo.
//!
//! ## Paths
//!
//! Paths are index based: `[block]` addresses a block, `[block, child]` a
//! child of a text block. `MoveNode` stays within one depth, and its
//! `new_path` is read after the node has been removed from `path`.

use crate::errors::{OperationError, OperationResult};
use crate::node::{EditorBlock, EditorTree, Inline, Node, Point, Range, TextElement, TextLeaf, VoidNode};
use folio_model::MarkDef;
use serde_json::{Map, Value as Json};
use std::sync::Arc;

pub type Properties = Map<String, Json>;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    InsertText {
        path: Vec<usize>,
        offset: usize,
        text: String,
    },
    RemoveText {
        path: Vec<usize>,
        offset: usize,
        text: String,
    },
    InsertNode {
        path: Vec<usize>,
        node: Node,
    },
    RemoveNode {
        path: Vec<usize>,
        node: Node,
    },
    /// The right half becomes a new sibling described by `properties`
    SplitNode {
        path: Vec<usize>,
        position: usize,
        properties: Properties,
    },
    /// Merge into the previous sibling, whose length was `position`
    MergeNode {
        path: Vec<usize>,
        position: usize,
        properties: Properties,
    },
    MoveNode {
        path: Vec<usize>,
        new_path: Vec<usize>,
    },
    /// `properties` holds the previous values, `Null` where a property was absent
    SetNode {
        path: Vec<usize>,
        properties: Properties,
        new_properties: Properties,
    },
    SetSelection {
        properties: Option<Range>,
        new_properties: Option<Range>,
    },
}

impl Operation {
    pub fn path(&self) -> Option<&[usize]> {
        match self {
            Operation::InsertText { path, .. }
            | Operation::RemoveText { path, .. }
            | Operation::InsertNode { path, .. }
            | Operation::RemoveNode { path, .. }
            | Operation::SplitNode { path, .. }
            | Operation::MergeNode { path, .. }
            | Operation::MoveNode { path, .. }
            | Operation::SetNode { path, .. } => Some(path),
            Operation::SetSelection { .. } => None,
        }
    }

    pub fn is_selection(&self) -> bool {
        matches!(self, Operation::SetSelection { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::InsertText { .. } => "insert_text",
            Operation::RemoveText { .. } => "remove_text",
            Operation::InsertNode { .. } => "insert_node",
            Operation::RemoveNode { .. } => "remove_node",
            Operation::SplitNode { .. } => "split_node",
            Operation::MergeNode { .. } => "merge_node",
            Operation::MoveNode { .. } => "move_node",
            Operation::SetNode { .. } => "set_node",
            Operation::SetSelection { .. } => "set_selection",
        }
    }

    pub fn inverse(&self) -> Operation {
        match self.clone() {
            Operation::InsertText { path, offset, text } => Operation::RemoveText { path, offset, text },
            Operation::RemoveText { path, offset, text } => Operation::InsertText { path, offset, text },
            Operation::InsertNode { path, node } => Operation::RemoveNode { path, node },
            Operation::RemoveNode { path, node } => Operation::InsertNode { path, node },
            Operation::SplitNode {
                path,
                position,
                properties,
            } => Operation::MergeNode {
                path: sibling(&path, 1),
                position,
                properties,
            },
            Operation::MergeNode {
                path,
                position,
                properties,
            } => Operation::SplitNode {
                path: sibling(&path, -1),
                position,
                properties,
            },
            Operation::MoveNode { path, new_path } => Operation::MoveNode {
                path: new_path,
                new_path: path,
            },
            Operation::SetNode {
                path,
                properties,
                new_properties,
            } => Operation::SetNode {
                path,
                properties: new_properties,
                new_properties: properties,
            },
            Operation::SetSelection {
                properties,
                new_properties,
            } => Operation::SetSelection {
                properties: new_properties,
                new_properties: properties,
            },
        }
    }

    /// Build a `SetNode` recording the current values of the touched properties
    pub fn set_node(tree: &[Arc<EditorBlock>], path: &[usize], new_properties: Properties) -> OperationResult<Self> {
        let properties = match path {
            [b] => {
                let block = tree.get(*b).ok_or_else(|| OperationError::NodeNotFound(path.to_vec()))?;
                new_properties
                    .keys()
                    .map(|name| (name.clone(), block_property(block, name)))
                    .collect()
            }
            [b, c] => {
                let inline = child(tree, *b, *c)?;
                new_properties
                    .keys()
                    .map(|name| (name.clone(), inline_property(inline, name)))
                    .collect()
            }
            _ => return Err(OperationError::InvalidPath(path.to_vec())),
        };
        Ok(Operation::SetNode {
            path: path.to_vec(),
            properties,
            new_properties,
        })
    }

    /// Split a leaf at a text offset, or a text block at a child index
    pub fn split(tree: &[Arc<EditorBlock>], path: &[usize], position: usize, new_key: String) -> OperationResult<Self> {
        let mut properties = match path {
            [b] => block_properties(tree.get(*b).ok_or_else(|| OperationError::NodeNotFound(path.to_vec()))?),
            [b, c] => inline_properties(child(tree, *b, *c)?),
            _ => return Err(OperationError::InvalidPath(path.to_vec())),
        };
        properties.insert("_key".into(), Json::String(new_key));
        Ok(Operation::SplitNode {
            path: path.to_vec(),
            position,
            properties,
        })
    }

    /// Merge the node at `path` into its previous sibling
    pub fn merge(tree: &[Arc<EditorBlock>], path: &[usize]) -> OperationResult<Self> {
        let (position, properties) = match path {
            [b] if *b > 0 => {
                let prev = tree
                    .get(b - 1)
                    .and_then(|p| p.as_text())
                    .ok_or_else(|| OperationError::CannotMerge(path.to_vec()))?;
                let node = tree.get(*b).ok_or_else(|| OperationError::NodeNotFound(path.to_vec()))?;
                (prev.children.len(), block_properties(node))
            }
            [b, c] if *c > 0 => {
                let prev = child(tree, *b, c - 1)?;
                (prev.text_len(), inline_properties(child(tree, *b, *c)?))
            }
            _ => return Err(OperationError::CannotMerge(path.to_vec())),
        };
        Ok(Operation::MergeNode {
            path: path.to_vec(),
            position,
            properties,
        })
    }

    pub fn apply(&self, tree: &mut EditorTree) -> OperationResult<()> {
        match self {
            Operation::InsertText { path, offset, text } => {
                let leaf = leaf_mut(tree, path)?;
                let at = byte_index(&leaf.text, *offset).ok_or(OperationError::OffsetOutOfRange {
                    offset: *offset,
                    len: leaf.len(),
                })?;
                leaf.text.insert_str(at, text);
                Ok(())
            }

            Operation::RemoveText { path, offset, text } => {
                let leaf = leaf_mut(tree, path)?;
                let len = leaf.len();
                let out_of_range = || OperationError::OffsetOutOfRange { offset: *offset, len };
                let start = byte_index(&leaf.text, *offset).ok_or_else(out_of_range)?;
                let end = byte_index(&leaf.text, offset + text.chars().count()).ok_or_else(out_of_range)?;
                if &leaf.text[start..end] != text {
                    return Err(OperationError::TextMismatch {
                        path: path.clone(),
                        offset: *offset,
                    });
                }
                leaf.text.replace_range(start..end, "");
                Ok(())
            }

            Operation::InsertNode { path, node } => match (path.as_slice(), node) {
                ([b], Node::Block(block)) if *b <= tree.len() => {
                    tree.insert(*b, Arc::new(block.clone()));
                    Ok(())
                }
                ([b, c], Node::Inline(inline)) => {
                    let element = element_mut(tree, *b)?;
                    if *c > element.children.len() {
                        return Err(OperationError::InvalidPath(path.clone()));
                    }
                    element.children.insert(*c, inline.clone());
                    Ok(())
                }
                _ => Err(OperationError::InvalidPath(path.clone())),
            },

            Operation::RemoveNode { path, node } => match path.as_slice() {
                [b] => {
                    if tree.get(*b).map(|n| n.key()) != Some(node.key()) {
                        return Err(OperationError::NodeNotFound(path.clone()));
                    }
                    tree.remove(*b);
                    Ok(())
                }
                [b, c] => {
                    let element = element_mut(tree, *b)?;
                    if element.children.get(*c).map(Inline::key) != Some(node.key()) {
                        return Err(OperationError::NodeNotFound(path.clone()));
                    }
                    element.children.remove(*c);
                    Ok(())
                }
                _ => Err(OperationError::InvalidPath(path.clone())),
            },

            Operation::SplitNode {
                path,
                position,
                properties,
            } => match path.as_slice() {
                [b] => {
                    let element = element_mut(tree, *b)?;
                    if *position > element.children.len() {
                        return Err(OperationError::InvalidPath(path.clone()));
                    }
                    let right: Vec<Inline> = element.children.drain(*position..).collect();
                    let mut block = EditorBlock::Text(TextElement {
                        key: String::new(),
                        block_type: element.block_type.clone(),
                        style: None,
                        list_item: None,
                        level: None,
                        mark_defs: Vec::new(),
                        fields: Map::new(),
                        children: right,
                    });
                    for (name, value) in properties {
                        set_block_property(&mut block, name, value)?;
                    }
                    tree.insert(b + 1, Arc::new(block));
                    Ok(())
                }
                [b, c] => {
                    let element = element_mut(tree, *b)?;
                    let leaf = element
                        .children
                        .get_mut(*c)
                        .and_then(Inline::as_text_mut)
                        .ok_or_else(|| OperationError::NotText(path.clone()))?;
                    let at = byte_index(&leaf.text, *position).ok_or(OperationError::OffsetOutOfRange {
                        offset: *position,
                        len: leaf.len(),
                    })?;
                    let right_text = leaf.text.split_off(at);
                    let mut right = Inline::Text(TextLeaf::new(String::new(), right_text, leaf.marks.clone()));
                    for (name, value) in properties {
                        set_inline_property(&mut right, name, value)?;
                    }
                    element.children.insert(c + 1, right);
                    Ok(())
                }
                _ => Err(OperationError::InvalidPath(path.clone())),
            },

            Operation::MergeNode { path, .. } => match path.as_slice() {
                [b] if *b > 0 && *b < tree.len() => {
                    let removed = match tree[*b].as_ref() {
                        EditorBlock::Text(t) => t.children.clone(),
                        EditorBlock::Void(_) => return Err(OperationError::CannotMerge(path.clone())),
                    };
                    let prev = element_mut(tree, b - 1).map_err(|_| OperationError::CannotMerge(path.clone()))?;
                    prev.children.extend(removed);
                    tree.remove(*b);
                    Ok(())
                }
                [b, c] if *c > 0 => {
                    let element = element_mut(tree, *b)?;
                    let removed = match element.children.get(*c) {
                        Some(Inline::Text(t)) => t.text.clone(),
                        _ => return Err(OperationError::CannotMerge(path.clone())),
                    };
                    let prev = element.children[c - 1]
                        .as_text_mut()
                        .ok_or_else(|| OperationError::CannotMerge(path.clone()))?;
                    prev.text.push_str(&removed);
                    element.children.remove(*c);
                    Ok(())
                }
                _ => Err(OperationError::CannotMerge(path.clone())),
            },

            Operation::MoveNode { path, new_path } => match (path.as_slice(), new_path.as_slice()) {
                ([from], [to]) => {
                    if *from >= tree.len() || *to >= tree.len() {
                        return Err(OperationError::InvalidPath(new_path.clone()));
                    }
                    let node = tree.remove(*from);
                    tree.insert(*to, node);
                    Ok(())
                }
                ([fb, fc], [tb, tc]) => {
                    let source_len = element_mut(tree, *fb)?.children.len();
                    let target_len = element_mut(tree, *tb)?.children.len();
                    let target_len = if fb == tb { target_len.saturating_sub(1) } else { target_len };
                    if *fc >= source_len || *tc > target_len {
                        return Err(OperationError::InvalidPath(new_path.clone()));
                    }
                    let node = element_mut(tree, *fb)?.children.remove(*fc);
                    element_mut(tree, *tb)?.children.insert(*tc, node);
                    Ok(())
                }
                _ => Err(OperationError::InvalidPath(new_path.clone())),
            },

            Operation::SetNode {
                path,
                new_properties,
                ..
            } => match path.as_slice() {
                [b] => {
                    let block = tree
                        .get_mut(*b)
                        .map(Arc::make_mut)
                        .ok_or_else(|| OperationError::NodeNotFound(path.clone()))?;
                    for (name, value) in new_properties {
                        set_block_property(block, name, value)?;
                    }
                    Ok(())
                }
                [b, c] => {
                    let element = element_mut(tree, *b)?;
                    let inline = element
                        .children
                        .get_mut(*c)
                        .ok_or_else(|| OperationError::NodeNotFound(path.clone()))?;
                    for (name, value) in new_properties {
                        set_inline_property(inline, name, value)?;
                    }
                    Ok(())
                }
                _ => Err(OperationError::InvalidPath(path.clone())),
            },

            Operation::SetSelection { .. } => Ok(()),
        }
    }

    /// Move a point through this operation.
    ///
    /// A point inside a removed node is moved to the end of the previous
    /// sibling (or the start of the next one); the caller clamps the result
    /// against the new tree.
    pub fn transform_point(&self, point: &Point) -> Point {
        let (mut b, mut c, mut o) = (point.block(), point.child(), point.offset);
        match self {
            Operation::InsertText { path, offset, text } => {
                if path.as_slice() == [b, c] && o >= *offset {
                    o += text.chars().count();
                }
            }
            Operation::RemoveText { path, offset, text } => {
                if path.as_slice() == [b, c] && o > *offset {
                    o -= (o - offset).min(text.chars().count());
                }
            }
            Operation::InsertNode { path, .. } => match path.as_slice() {
                [pb] if b >= *pb => b += 1,
                [pb, pc] if b == *pb && c >= *pc => c += 1,
                _ => {}
            },
            Operation::RemoveNode { path, .. } => match path.as_slice() {
                [pb] if b == *pb => {
                    if *pb > 0 {
                        (b, c, o) = (pb - 1, usize::MAX, usize::MAX);
                    } else {
                        (b, c, o) = (0, 0, 0);
                    }
                }
                [pb] if b > *pb => b -= 1,
                [pb, pc] if b == *pb && c == *pc => {
                    if *pc > 0 {
                        (c, o) = (pc - 1, usize::MAX);
                    } else {
                        (c, o) = (0, 0);
                    }
                }
                [pb, pc] if b == *pb && c > *pc => c -= 1,
                _ => {}
            },
            Operation::SplitNode { path, position, .. } => match path.as_slice() {
                [pb] if b == *pb && c >= *position => {
                    b += 1;
                    c -= position;
                }
                [pb] if b > *pb => b += 1,
                [pb, pc] if b == *pb && c == *pc && o >= *position => {
                    c += 1;
                    o -= position;
                }
                [pb, pc] if b == *pb && c > *pc => c += 1,
                _ => {}
            },
            Operation::MergeNode { path, position, .. } => match path.as_slice() {
                [pb] if b == *pb && *pb > 0 => {
                    b -= 1;
                    c += position;
                }
                [pb] if b > *pb => b -= 1,
                [pb, pc] if b == *pb && c == *pc && *pc > 0 => {
                    c -= 1;
                    o += position;
                }
                [pb, pc] if b == *pb && c > *pc => c -= 1,
                _ => {}
            },
            Operation::MoveNode { path, new_path } => match (path.as_slice(), new_path.as_slice()) {
                ([from], [to]) => {
                    if b == *from {
                        b = *to;
                    } else {
                        if b > *from {
                            b -= 1;
                        }
                        if b >= *to {
                            b += 1;
                        }
                    }
                }
                ([fb, fc], [tb, tc]) => {
                    if b == *fb && c == *fc {
                        (b, c) = (*tb, *tc);
                    } else {
                        if b == *fb && c > *fc {
                            c -= 1;
                        }
                        if b == *tb && c >= *tc {
                            c += 1;
                        }
                    }
                }
                _ => {}
            },
            Operation::SetNode { .. } | Operation::SetSelection { .. } => {}
        }
        Point::new(b, c, o)
    }

    pub fn transform_range(&self, range: &Range) -> Range {
        Range::new(self.transform_point(&range.anchor), self.transform_point(&range.focus))
    }
}

fn sibling(path: &[usize], delta: isize) -> Vec<usize> {
    let mut path = path.to_vec();
    if let Some(last) = path.last_mut() {
        *last = last.saturating_add_signed(delta);
    }
    path
}

/// Byte index of the `offset`-th char; `offset == len` maps to the end
fn byte_index(text: &str, offset: usize) -> Option<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .nth(offset)
}

fn child<'a>(tree: &'a [Arc<EditorBlock>], block: usize, index: usize) -> OperationResult<&'a Inline> {
    tree.get(block)
        .and_then(|b| b.as_text())
        .and_then(|t| t.children.get(index))
        .ok_or_else(|| OperationError::NodeNotFound(vec![block, index]))
}

fn element_mut(tree: &mut EditorTree, index: usize) -> OperationResult<&mut TextElement> {
    tree.get_mut(index)
        .map(Arc::make_mut)
        .ok_or(OperationError::NodeNotFound(vec![index]))?
        .as_text_mut()
        .ok_or(OperationError::NotTextBlock(vec![index]))
}

fn leaf_mut<'a>(tree: &'a mut EditorTree, path: &[usize]) -> OperationResult<&'a mut TextLeaf> {
    let [b, c] = path else {
        return Err(OperationError::InvalidPath(path.to_vec()));
    };
    element_mut(tree, *b)?
        .children
        .get_mut(*c)
        .ok_or_else(|| OperationError::NodeNotFound(path.to_vec()))?
        .as_text_mut()
        .ok_or_else(|| OperationError::NotText(path.to_vec()))
}

fn invalid(name: &str, message: impl Into<String>) -> OperationError {
    OperationError::InvalidProperty {
        name: name.to_string(),
        message: message.into(),
    }
}

fn string_property(name: &str, value: &Json) -> OperationResult<Option<String>> {
    match value {
        Json::Null => Ok(None),
        Json::String(s) => Ok(Some(s.clone())),
        _ => Err(invalid(name, "expected a string")),
    }
}

/// Every property of a block except its children
pub fn block_properties(block: &EditorBlock) -> Properties {
    let mut properties = Properties::new();
    properties.insert("_key".into(), Json::String(block.key().to_string()));
    properties.insert("_type".into(), Json::String(block.node_type().to_string()));
    match block {
        EditorBlock::Text(t) => {
            for name in ["style", "listItem", "level", "markDefs"] {
                let value = block_property(block, name);
                if !value.is_null() {
                    properties.insert(name.into(), value);
                }
            }
            properties.extend(t.fields.clone());
        }
        EditorBlock::Void(v) => properties.extend(v.value.clone()),
    }
    properties
}

pub fn block_property(block: &EditorBlock, name: &str) -> Json {
    match (block, name) {
        (_, "_key") => Json::String(block.key().to_string()),
        (_, "_type") => Json::String(block.node_type().to_string()),
        (EditorBlock::Text(t), "style") => t.style.clone().map(Json::String).unwrap_or(Json::Null),
        (EditorBlock::Text(t), "listItem") => t.list_item.clone().map(Json::String).unwrap_or(Json::Null),
        (EditorBlock::Text(t), "level") => t.level.map(Json::from).unwrap_or(Json::Null),
        (EditorBlock::Text(t), "markDefs") => serde_json::to_value(&t.mark_defs).unwrap_or(Json::Null),
        (EditorBlock::Text(t), field) => t.fields.get(field).cloned().unwrap_or(Json::Null),
        (EditorBlock::Void(v), field) => v.value.get(field).cloned().unwrap_or(Json::Null),
    }
}

pub fn set_block_property(block: &mut EditorBlock, name: &str, value: &Json) -> OperationResult<()> {
    match (block, name) {
        (EditorBlock::Text(t), "_key") => t.key = string_property(name, value)?.ok_or_else(|| invalid(name, "required"))?,
        (EditorBlock::Void(v), "_key") => v.key = string_property(name, value)?.ok_or_else(|| invalid(name, "required"))?,
        (EditorBlock::Text(t), "_type") => {
            t.block_type = string_property(name, value)?.ok_or_else(|| invalid(name, "required"))?
        }
        (EditorBlock::Void(v), "_type") => {
            v.node_type = string_property(name, value)?.ok_or_else(|| invalid(name, "required"))?
        }
        (EditorBlock::Text(t), "style") => t.style = string_property(name, value)?,
        (EditorBlock::Text(t), "listItem") => t.list_item = string_property(name, value)?,
        (EditorBlock::Text(t), "level") => {
            t.level = match value {
                Json::Null => None,
                other => Some(other.as_u64().ok_or_else(|| invalid(name, "expected a number"))? as u32),
            }
        }
        (EditorBlock::Text(t), "markDefs") => {
            t.mark_defs = match value {
                Json::Null => Vec::new(),
                other => serde_json::from_value::<Vec<MarkDef>>(other.clone()).map_err(|e| invalid(name, e.to_string()))?,
            }
        }
        (EditorBlock::Text(_), "children") => return Err(invalid(name, "children are edited through node operations")),
        (EditorBlock::Text(t), field) => set_field(&mut t.fields, field, value),
        (EditorBlock::Void(v), field) => set_field(&mut v.value, field, value),
    }
    Ok(())
}

fn set_field(map: &mut Map<String, Json>, name: &str, value: &Json) {
    if value.is_null() {
        map.remove(name);
    } else {
        map.insert(name.to_string(), value.clone());
    }
}

/// Every property of an inline node except leaf text
pub fn inline_properties(inline: &Inline) -> Properties {
    let mut properties = Properties::new();
    properties.insert("_key".into(), Json::String(inline.key().to_string()));
    match inline {
        Inline::Text(t) => {
            properties.insert("marks".into(), Json::from(t.marks.clone()));
        }
        Inline::Void(v) => {
            properties.insert("_type".into(), Json::String(v.node_type.clone()));
            properties.extend(v.value.clone());
        }
    }
    properties
}

pub fn inline_property(inline: &Inline, name: &str) -> Json {
    match (inline, name) {
        (_, "_key") => Json::String(inline.key().to_string()),
        (Inline::Text(t), "marks") => Json::from(t.marks.clone()),
        (Inline::Text(t), "text") => Json::String(t.text.clone()),
        (Inline::Text(_), _) => Json::Null,
        (Inline::Void(v), "_type") => Json::String(v.node_type.clone()),
        (Inline::Void(v), field) => v.value.get(field).cloned().unwrap_or(Json::Null),
    }
}

pub fn set_inline_property(inline: &mut Inline, name: &str, value: &Json) -> OperationResult<()> {
    match (inline, name) {
        (Inline::Text(t), "_key") => t.key = string_property(name, value)?.ok_or_else(|| invalid(name, "required"))?,
        (Inline::Void(v), "_key") => v.key = string_property(name, value)?.ok_or_else(|| invalid(name, "required"))?,
        (Inline::Text(t), "marks") => {
            t.marks = match value {
                Json::Null => Vec::new(),
                other => serde_json::from_value(other.clone()).map_err(|e| invalid(name, e.to_string()))?,
            }
        }
        (Inline::Text(t), "text") => t.text = string_property(name, value)?.unwrap_or_default(),
        (Inline::Text(_), _) => return Err(invalid(name, "unknown span property")),
        (Inline::Void(v), "_type") => {
            v.node_type = string_property(name, value)?.ok_or_else(|| invalid(name, "required"))?
        }
        (Inline::Void(v), field) => set_field(&mut v.value, field, value),
    }
    Ok(())
}

/// Void node helper used by editor commands
pub fn void_node(key: String, node_type: &str, value: Map<String, Json>, inline: bool) -> VoidNode {
    VoidNode {
        key,
        node_type: node_type.to_string(),
        value,
        inline,
    }
}
