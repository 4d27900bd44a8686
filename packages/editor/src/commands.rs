//! # Editor API
//!
//! Commands the rendering layer calls on a session. Each command builds
//! operations against the current tree and runs them as one local edit.

use crate::change::EditorChange;
use crate::convert::{block_from_internal, inline_from_internal};
use crate::errors::{EditorError, EditorResult, OperationError};
use crate::node::{clamp_range, leaf_at, placeholder_block, EditorBlock, Inline, Node, Point, Range, TextLeaf};
use crate::operations::{void_node, Operation, Properties};
use crate::session::EditorSession;
use folio_model::{Block, Child, MarkDef, Path, PathSegment};
use serde::Serialize;
use serde_json::{Map, Value as Json};

/// Where `add_annotation` put the new mark
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPaths {
    pub span_path: Path,
    pub mark_def_path: Path,
}

/// Result of `find_by_path`
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Block(Block),
    Child(Child),
}

fn mark_defs_json(defs: &[MarkDef]) -> Json {
    serde_json::to_value(defs).unwrap_or_else(|_| Json::Array(Vec::new()))
}

fn sorted(marks: &[String]) -> Vec<String> {
    let mut marks = marks.to_vec();
    marks.sort();
    marks.dedup();
    marks
}

impl EditorSession {
    pub fn focus(&mut self) {
        if !self.focused {
            self.focused = true;
            self.bus.emit(EditorChange::Focus);
        }
    }

    pub fn blur(&mut self) {
        if self.focused {
            self.focused = false;
            self.bus.emit(EditorChange::Blur);
        }
    }

    /// Apply a raw operation as a local edit
    pub fn apply(&mut self, op: Operation) -> EditorResult<()> {
        self.run_command(|s| s.apply_op(op))
    }

    /// Set the selection, given in the coordinates of the current tree
    pub fn select(&mut self, range: Option<Range>) -> EditorResult<()> {
        self.run_command(|s| {
            let next = range.map(|r| clamp_range(&s.tree, &r));
            if next != s.selection {
                s.pending_marks = None;
            }
            s.apply_op(Operation::SetSelection {
                properties: s.selection.clone(),
                new_properties: next,
            })
        })
    }

    fn require_selection(&self) -> EditorResult<Range> {
        self.selection.clone().ok_or(EditorError::NoSelection)
    }

    /// Text leaves overlapping `range`; a collapsed range yields the leaf holding it
    fn leaves_in(&self, range: &Range) -> Vec<(usize, usize)> {
        let (start, end) = (range.start(), range.end());
        if range.is_collapsed() {
            return leaf_at(&self.tree, start)
                .map(|_| vec![(start.block(), start.child())])
                .unwrap_or_default();
        }
        let mut leaves = Vec::new();
        for b in start.block()..=end.block() {
            let Some(element) = self.tree.get(b).and_then(|n| n.as_text()) else {
                continue;
            };
            for (c, child) in element.children.iter().enumerate() {
                let Inline::Text(leaf) = child else {
                    continue;
                };
                if &Point::new(b, c, 0) < end && &Point::new(b, c, leaf.len()) > start {
                    leaves.push((b, c));
                }
            }
        }
        leaves
    }

    fn leaf(&self, b: usize, c: usize) -> Option<&TextLeaf> {
        leaf_at(&self.tree, &Point::new(b, c, 0))
    }

    fn selected_text_blocks(&self) -> EditorResult<Vec<usize>> {
        let range = self.require_selection()?;
        Ok((range.start().block()..=range.end().block())
            .filter(|&b| self.tree.get(b).is_some_and(|n| n.as_text().is_some()))
            .collect())
    }

    pub fn is_mark_active(&self, mark: &str) -> bool {
        let Some(range) = &self.selection else {
            return false;
        };
        if range.is_collapsed() {
            if let Some(pending) = &self.pending_marks {
                return pending.iter().any(|m| m == mark);
            }
        }
        let leaves = self.leaves_in(range);
        !leaves.is_empty()
            && leaves
                .iter()
                .all(|&(b, c)| self.leaf(b, c).is_some_and(|leaf| leaf.has_mark(mark)))
    }

    /// Toggle a decorator. A collapsed selection only changes the marks the
    /// next typed text gets.
    pub fn toggle_mark(&mut self, mark: &str) -> EditorResult<()> {
        let range = self.require_selection()?;
        let active = self.is_mark_active(mark);
        let apply = |marks: &mut Vec<String>| {
            if active {
                marks.retain(|m| m != mark);
            } else if !marks.iter().any(|m| m == mark) {
                marks.push(mark.to_string());
            }
        };

        if range.is_collapsed() {
            let mut marks = self
                .pending_marks
                .clone()
                .or_else(|| leaf_at(&self.tree, &range.focus).map(|l| l.marks.clone()))
                .unwrap_or_default();
            apply(&mut marks);
            self.pending_marks = Some(marks);
            self.emit_selection();
            return Ok(());
        }

        self.run_command(|s| {
            s.split_at_range_bounds()?;
            let range = s.require_selection()?;
            for (b, c) in s.leaves_in(&range) {
                let Some(leaf) = s.leaf(b, c) else {
                    continue;
                };
                let mut marks = leaf.marks.clone();
                apply(&mut marks);
                if marks != leaf.marks {
                    s.set_marks(b, c, marks)?;
                }
            }
            Ok(())
        })
    }

    pub fn toggle_block_style(&mut self, style: &str) -> EditorResult<()> {
        self.run_command(|s| {
            let blocks = s.selected_text_blocks()?;
            let style_of = |b: usize| s.tree[b].as_text().and_then(|t| t.style.clone());
            let all = !blocks.is_empty() && blocks.iter().all(|&b| style_of(b).as_deref() == Some(style));
            let next = if all {
                s.schema.default_style.clone()
            } else {
                style.to_string()
            };

            for b in blocks {
                if s.tree.get(b).and_then(|n| n.as_text()).and_then(|t| t.style.as_deref()) == Some(next.as_str()) {
                    continue;
                }
                let mut properties = Properties::new();
                properties.insert("style".into(), Json::String(next.clone()));
                let op = Operation::set_node(&s.tree, &[b], properties)?;
                s.apply_op(op)?;
            }
            Ok(())
        })
    }

    pub fn toggle_list(&mut self, list_style: &str) -> EditorResult<()> {
        self.run_command(|s| {
            let blocks = s.selected_text_blocks()?;
            let all = !blocks.is_empty()
                && blocks
                    .iter()
                    .all(|&b| s.tree[b].as_text().and_then(|t| t.list_item.as_deref()) == Some(list_style));

            for b in blocks {
                let level = s.tree.get(b).and_then(|n| n.as_text()).and_then(|t| t.level);
                let mut properties = Properties::new();
                if all {
                    properties.insert("listItem".into(), Json::Null);
                    properties.insert("level".into(), Json::Null);
                } else {
                    properties.insert("listItem".into(), Json::String(list_style.to_string()));
                    properties.insert("level".into(), Json::from(level.unwrap_or(1)));
                }
                let op = Operation::set_node(&s.tree, &[b], properties)?;
                s.apply_op(op)?;
            }
            Ok(())
        })
    }

    pub fn focus_block(&self) -> Option<Block> {
        let focus = &self.selection.as_ref()?.focus;
        block_from_internal(self.tree.get(focus.block())?, &self.schema).ok()
    }

    pub fn focus_child(&self) -> Option<Child> {
        let focus = &self.selection.as_ref()?.focus;
        let element = self.tree.get(focus.block())?.as_text()?;
        inline_from_internal(element.children.get(focus.child())?, &element.key, &self.schema).ok()
    }

    /// Insert a block after the focused one (or at the end) and move the caret into it
    pub fn insert_block(&mut self, block_type: &str, value: Option<Map<String, Json>>) -> EditorResult<Path> {
        self.run_command(|s| {
            let key = s.keys.new_key();
            let block = if block_type == s.schema.block_type {
                let mut block = placeholder_block(key.clone(), s.keys.new_key(), &s.schema);
                if let (EditorBlock::Text(text), Some(fields)) = (&mut block, value) {
                    text.fields = fields;
                }
                block
            } else {
                EditorBlock::Void(void_node(key.clone(), block_type, value.unwrap_or_default(), false))
            };
            let index = s
                .selection
                .as_ref()
                .map_or(s.tree.len(), |r| r.focus.block() + 1)
                .min(s.tree.len());

            s.apply_op(Operation::InsertNode {
                path: vec![index],
                node: Node::Block(block),
            })?;
            s.apply_op(Operation::SetSelection {
                properties: s.selection.clone(),
                new_properties: Some(Range::collapsed(Point::new(index, 0, 0))),
            })?;
            Ok(Path::block(&key))
        })
    }

    /// Insert an inline object at the caret
    pub fn insert_child(&mut self, child_type: &str, value: Option<Map<String, Json>>) -> EditorResult<Path> {
        self.run_command(|s| {
            let focus = s.require_selection()?.focus;
            let b = focus.block();
            let block_key = s
                .tree
                .get(b)
                .and_then(|n| n.as_text())
                .map(|t| t.key.clone())
                .ok_or(EditorError::NotInTextBlock)?;

            let index = match s.leaf(b, focus.child()).map(TextLeaf::len) {
                Some(_) if focus.offset == 0 => focus.child(),
                Some(len) if focus.offset < len => {
                    s.split_leaf_at(&focus)?;
                    focus.child() + 1
                }
                _ => focus.child() + 1,
            };

            let key = s.keys.new_key();
            let node = Inline::Void(void_node(key.clone(), child_type, value.unwrap_or_default(), true));
            s.apply_op(Operation::InsertNode {
                path: vec![b, index],
                node: Node::Inline(node),
            })?;

            let has_next = s.leaf(b, index + 1).is_some();
            let caret = if has_next {
                Point::new(b, index + 1, 0)
            } else {
                Point::new(b, index, 0)
            };
            s.apply_op(Operation::SetSelection {
                properties: s.selection.clone(),
                new_properties: Some(Range::collapsed(caret)),
            })?;
            Ok(Path::child(&block_key, &key))
        })
    }

    /// Mark the selected text with a new annotation. `None` for a collapsed
    /// or missing selection.
    pub fn add_annotation(
        &mut self,
        annotation_type: &str,
        value: Option<Map<String, Json>>,
    ) -> EditorResult<Option<AnnotationPaths>> {
        if self.selection.as_ref().map_or(true, Range::is_collapsed) {
            return Ok(None);
        }

        self.run_command(|s| {
            s.split_at_range_bounds()?;
            let range = s.require_selection()?;
            let leaves = s.leaves_in(&range);
            let Some(&(first_block, first_child)) = leaves.first() else {
                return Ok(None);
            };

            let def_key = s.keys.new_key();
            let mut blocks: Vec<usize> = leaves.iter().map(|&(b, _)| b).collect();
            blocks.dedup();
            for b in blocks {
                let Some(element) = s.tree.get(b).and_then(|n| n.as_text()) else {
                    continue;
                };
                let mut defs = element.mark_defs.clone();
                defs.push(MarkDef {
                    key: def_key.clone(),
                    def_type: annotation_type.to_string(),
                    fields: value.clone().unwrap_or_default(),
                });
                let mut properties = Properties::new();
                properties.insert("markDefs".into(), mark_defs_json(&defs));
                let op = Operation::set_node(&s.tree, &[b], properties)?;
                s.apply_op(op)?;
            }

            for &(b, c) in &leaves {
                if let Some(leaf) = s.leaf(b, c) {
                    let mut marks = leaf.marks.clone();
                    marks.push(def_key.clone());
                    s.set_marks(b, c, marks)?;
                }
            }

            let block_key = s.tree[first_block].key().to_string();
            let span_key = s
                .leaf(first_block, first_child)
                .map(|l| l.key.clone())
                .unwrap_or_default();
            Ok(Some(AnnotationPaths {
                span_path: Path::child(&block_key, &span_key),
                mark_def_path: Path::mark_def(&block_key, &def_key),
            }))
        })
    }

    /// Remove every annotation active in the selection
    pub fn remove_annotation(&mut self) -> EditorResult<()> {
        let active: Vec<String> = self.active_annotations().into_iter().map(|d| d.key).collect();
        if active.is_empty() {
            return Ok(());
        }

        self.run_command(|s| {
            let range = s.require_selection()?;
            for b in range.start().block()..=range.end().block() {
                let Some(element) = s.tree.get(b).and_then(|n| n.as_text()) else {
                    continue;
                };
                let targets: Vec<(usize, Vec<String>)> = element
                    .children
                    .iter()
                    .enumerate()
                    .filter_map(|(c, child)| {
                        let leaf = child.as_text()?;
                        leaf.marks.iter().any(|m| active.contains(m)).then(|| {
                            (c, leaf.marks.iter().filter(|m| !active.contains(m)).cloned().collect())
                        })
                    })
                    .collect();
                for (c, marks) in targets {
                    s.set_marks(b, c, marks)?;
                }
            }
            Ok(())
        })
    }

    /// Annotations referenced by the selected text
    pub fn active_annotations(&self) -> Vec<MarkDef> {
        let Some(range) = &self.selection else {
            return Vec::new();
        };
        let mut found: Vec<MarkDef> = Vec::new();
        for (b, c) in self.leaves_in(range) {
            let (Some(element), Some(leaf)) = (self.tree[b].as_text(), self.leaf(b, c)) else {
                continue;
            };
            for def in &element.mark_defs {
                if leaf.has_mark(&def.key) && !found.iter().any(|d| d.key == def.key) {
                    found.push(def.clone());
                }
            }
        }
        found
    }

    /// Resolve a block or child path; the returned path is key based
    pub fn find_by_path(&self, path: &Path) -> Option<(Entity, Path)> {
        let segments = path.segments();
        let index_of = |segment: &PathSegment, keys: Vec<&str>| match segment {
            PathSegment::Key(k) => keys.iter().position(|key| *key == k.key),
            PathSegment::Index(i) => {
                let i = if *i < 0 { keys.len() as isize + i } else { *i };
                (0..keys.len() as isize).contains(&i).then_some(i as usize)
            }
            PathSegment::Field(_) => None,
        };

        let b = index_of(segments.first()?, self.tree.iter().map(|n| n.key()).collect())?;
        let block = &self.tree[b];
        match &segments[1..] {
            [] => {
                let entity = Entity::Block(block_from_internal(block, &self.schema).ok()?);
                Some((entity, Path::block(block.key())))
            }
            [children, child, ..] if children.as_field() == Some("children") => {
                let element = block.as_text()?;
                let c = index_of(child, element.children.iter().map(Inline::key).collect())?;
                let inline = &element.children[c];
                let entity = Entity::Child(inline_from_internal(inline, &element.key, &self.schema).ok()?);
                Some((entity, Path::child(&element.key, inline.key())))
            }
            _ => None,
        }
    }

    /// Type text at the caret, replacing an expanded selection
    pub fn insert_text(&mut self, text: &str) -> EditorResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.run_command(|s| {
            let mut range = s.require_selection()?;
            if !range.is_collapsed() {
                s.delete_range(&range)?;
                range = s.require_selection()?;
            }
            let point = range.focus;
            let (b, c) = (point.block(), point.child());
            let leaf = s.leaf(b, c).cloned().ok_or(EditorError::NotInTextBlock)?;

            match s.pending_marks.take() {
                Some(marks) if sorted(&marks) != sorted(&leaf.marks) => {
                    let index = if point.offset == 0 {
                        c
                    } else {
                        if point.offset < leaf.len() {
                            s.split_leaf_at(&point)?;
                        }
                        c + 1
                    };
                    let node = Inline::Text(TextLeaf::new(s.keys.new_key(), text, marks));
                    s.apply_op(Operation::InsertNode {
                        path: vec![b, index],
                        node: Node::Inline(node),
                    })?;
                    s.apply_op(Operation::SetSelection {
                        properties: s.selection.clone(),
                        new_properties: Some(Range::collapsed(Point::new(b, index, text.chars().count()))),
                    })
                }
                _ => s.apply_op(Operation::InsertText {
                    path: point.path,
                    offset: point.offset,
                    text: text.to_string(),
                }),
            }
        })
    }

    /// Backspace
    pub fn delete_backward(&mut self) -> EditorResult<()> {
        self.run_command(|s| {
            let range = s.require_selection()?;
            if !range.is_collapsed() {
                return s.delete_range(&range);
            }
            let (b, c, offset) = (range.focus.block(), range.focus.child(), range.focus.offset);

            let Some(element) = s.tree.get(b).and_then(|n| n.as_text()) else {
                let op = s.remove_node_op(&[b])?;
                return s.apply_op(op);
            };
            if offset > 0 {
                return match s.remove_text_op(b, c, offset - 1, offset) {
                    Some(op) => s.apply_op(op),
                    None => Ok(()),
                };
            }
            if c > 0 {
                let previous_len = element.children[c - 1].as_text().map(TextLeaf::len);
                let op = match previous_len {
                    Some(len) if len > 0 => s.remove_text_op(b, c - 1, len - 1, len),
                    _ => Some(s.remove_node_op(&[b, c - 1])?),
                };
                return match op {
                    Some(op) => s.apply_op(op),
                    None => Ok(()),
                };
            }
            if b == 0 {
                return Ok(());
            }
            s.join_with_previous(b)
        })
    }

    /// Split the block at the caret
    pub fn insert_break(&mut self) -> EditorResult<()> {
        self.run_command(|s| {
            let mut range = s.require_selection()?;
            if !range.is_collapsed() {
                s.delete_range(&range)?;
                range = s.require_selection()?;
            }
            let point = range.focus;
            let b = point.block();

            let Some(leaf_len) = s.tree.get(b).and_then(|n| n.as_text()).map(|t| {
                t.children.get(point.child()).map(Inline::text_len).unwrap_or(0)
            }) else {
                let block = placeholder_block(s.keys.new_key(), s.keys.new_key(), &s.schema);
                s.apply_op(Operation::InsertNode {
                    path: vec![b + 1],
                    node: Node::Block(block),
                })?;
                return s.select_start_of(b + 1);
            };

            let position = if point.offset == 0 {
                point.child()
            } else {
                if point.offset < leaf_len {
                    s.split_leaf_at(&point)?;
                }
                point.child() + 1
            };
            let key = s.keys.new_key();
            let op = Operation::split(&s.tree, &[b], position, key)?;
            s.apply_op(op)?;

            if s.tree.get(b + 1).and_then(|n| n.as_text()).is_some_and(|t| t.children.is_empty()) {
                let leaf = Inline::Text(TextLeaf::new(s.keys.new_key(), "", Vec::new()));
                s.apply_op(Operation::InsertNode {
                    path: vec![b + 1, 0],
                    node: Node::Inline(leaf),
                })?;
            }
            s.select_start_of(b + 1)
        })
    }

    fn select_start_of(&mut self, block: usize) -> EditorResult<()> {
        self.apply_op(Operation::SetSelection {
            properties: self.selection.clone(),
            new_properties: Some(Range::collapsed(Point::new(block, 0, 0))),
        })
    }

    fn set_marks(&mut self, b: usize, c: usize, marks: Vec<String>) -> EditorResult<()> {
        let mut properties = Properties::new();
        properties.insert("marks".into(), Json::from(marks));
        let op = Operation::set_node(&self.tree, &[b, c], properties)?;
        self.apply_op(op)
    }

    /// Split the leaf under `point` when the point is strictly inside it
    fn split_leaf_at(&mut self, point: &Point) -> EditorResult<bool> {
        let Some(len) = leaf_at(&self.tree, point).map(TextLeaf::len) else {
            return Ok(false);
        };
        if point.offset == 0 || point.offset >= len {
            return Ok(false);
        }
        let key = self.keys.new_key();
        let op = Operation::split(&self.tree, &point.path, point.offset, key)?;
        self.apply_op(op)?;
        Ok(true)
    }

    /// Make both ends of the selection fall on leaf boundaries
    fn split_at_range_bounds(&mut self) -> EditorResult<()> {
        let end = self.require_selection()?.end().clone();
        self.split_leaf_at(&end)?;
        let start = self.require_selection()?.start().clone();
        self.split_leaf_at(&start)?;
        Ok(())
    }

    fn remove_text_op(&self, b: usize, c: usize, from: usize, to: usize) -> Option<Operation> {
        let leaf = self.leaf(b, c)?;
        let to = to.min(leaf.len());
        if from >= to {
            return None;
        }
        Some(Operation::RemoveText {
            path: vec![b, c],
            offset: from,
            text: leaf.text.chars().skip(from).take(to - from).collect(),
        })
    }

    fn remove_node_op(&self, path: &[usize]) -> EditorResult<Operation> {
        let missing = || EditorError::Operation(OperationError::NodeNotFound(path.to_vec()));
        let node = match path {
            [b] => Node::Block(self.tree.get(*b).ok_or_else(missing)?.as_ref().clone()),
            [b, c] => Node::Inline(
                self.tree
                    .get(*b)
                    .and_then(|n| n.as_text())
                    .and_then(|t| t.children.get(*c))
                    .ok_or_else(missing)?
                    .clone(),
            ),
            _ => return Err(missing()),
        };
        Ok(Operation::RemoveNode {
            path: path.to_vec(),
            node,
        })
    }

    /// Merge block `b` into the one before it, carrying its mark definitions
    fn join_with_previous(&mut self, b: usize) -> EditorResult<()> {
        let (Some(previous), Some(current)) = (self.tree.get(b - 1), self.tree.get(b)) else {
            return Ok(());
        };
        let (EditorBlock::Text(previous), EditorBlock::Text(current)) = (previous.as_ref(), current.as_ref()) else {
            // Object blocks are removed instead of merged
            let target = if previous.as_text().is_none() { b - 1 } else { b };
            let op = self.remove_node_op(&[target])?;
            return self.apply_op(op);
        };

        let mut defs = previous.mark_defs.clone();
        for def in &current.mark_defs {
            if !defs.iter().any(|d| d.key == def.key) {
                defs.push(def.clone());
            }
        }
        if defs.len() != previous.mark_defs.len() {
            let mut properties = Properties::new();
            properties.insert("markDefs".into(), mark_defs_json(&defs));
            let op = Operation::set_node(&self.tree, &[b - 1], properties)?;
            self.apply_op(op)?;
        }
        let op = Operation::merge(&self.tree, &[b])?;
        self.apply_op(op)
    }

    /// Delete the content of an expanded range and collapse to its start
    pub(crate) fn delete_range(&mut self, range: &Range) -> EditorResult<()> {
        let (start, end) = (range.start().clone(), range.end().clone());
        let (sb, eb) = (start.block(), end.block());
        let is_text = |s: &Self, b: usize| s.tree.get(b).is_some_and(|n| n.as_text().is_some());
        let child_count = |s: &Self, b: usize| s.tree.get(b).and_then(|n| n.as_text()).map_or(0, |t| t.children.len());

        if sb == eb {
            if !is_text(self, sb) {
                return Ok(());
            }
            if start.child() == end.child() {
                if let Some(op) = self.remove_text_op(sb, start.child(), start.offset, end.offset) {
                    self.apply_op(op)?;
                }
            } else {
                self.trim_leaf(sb, end.child(), 0, end.offset)?;
                for c in (start.child() + 1..end.child()).rev() {
                    let op = self.remove_node_op(&[sb, c])?;
                    self.apply_op(op)?;
                }
                self.trim_leaf(sb, start.child(), start.offset, usize::MAX)?;
            }
        } else {
            if is_text(self, eb) {
                self.trim_leaf(eb, end.child(), 0, end.offset)?;
                for c in (0..end.child()).rev() {
                    let op = self.remove_node_op(&[eb, c])?;
                    self.apply_op(op)?;
                }
            }
            for b in (sb + 1..eb).rev() {
                let op = self.remove_node_op(&[b])?;
                self.apply_op(op)?;
            }
            if is_text(self, sb) {
                for c in (start.child() + 1..child_count(self, sb)).rev() {
                    let op = self.remove_node_op(&[sb, c])?;
                    self.apply_op(op)?;
                }
                self.trim_leaf(sb, start.child(), start.offset, usize::MAX)?;
            }
            self.join_with_previous(sb + 1)?;
        }

        let caret = clamp_range(&self.tree, &Range::collapsed(start));
        self.apply_op(Operation::SetSelection {
            properties: self.selection.clone(),
            new_properties: Some(caret),
        })
    }

    fn trim_leaf(&mut self, b: usize, c: usize, from: usize, to: usize) -> EditorResult<()> {
        match self.remove_text_op(b, c, from, to) {
            Some(op) => self.apply_op(op),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EditorConfig;
    use serde_json::json;
    use std::sync::Arc;

    fn session(value: Json) -> EditorSession {
        let mut session =
            EditorSession::with_clock(EditorConfig::default(), "cmd", Arc::new(ManualClock::new(0)));
        session.set_value(Some(value)).unwrap();
        session
    }

    fn two_blocks() -> Json {
        json!([
            {"_key": "a", "_type": "block", "style": "normal", "markDefs": [], "children": [
                {"_key": "a1", "_type": "span", "text": "Hello world", "marks": []}
            ]},
            {"_key": "b", "_type": "block", "style": "normal", "markDefs": [], "children": [
                {"_key": "b1", "_type": "span", "text": "Second", "marks": []}
            ]}
        ])
    }

    fn texts(session: &EditorSession) -> Vec<String> {
        session.tree().iter().filter_map(|b| b.as_text()).map(|t| t.text()).collect()
    }

    fn caret(b: usize, c: usize, o: usize) -> Option<Range> {
        Some(Range::collapsed(Point::new(b, c, o)))
    }

    #[test]
    fn test_typing_moves_the_caret() {
        let mut s = session(two_blocks());
        s.select(caret(0, 0, 5)).unwrap();
        s.insert_text(",").unwrap();
        assert_eq!(texts(&s)[0], "Hello, world");
        assert_eq!(s.selection(), caret(0, 0, 6).as_ref());
    }

    #[test]
    fn test_toggle_mark_on_expanded_selection() {
        let mut s = session(two_blocks());
        s.select(Some(Range::new(Point::new(0, 0, 6), Point::new(0, 0, 11)))).unwrap();
        s.toggle_mark("strong").unwrap();

        let block = s.tree()[0].as_text().unwrap();
        assert_eq!(block.children.len(), 2);
        assert_eq!(block.children[1].as_text().unwrap().text, "world");
        assert!(s.is_mark_active("strong"));

        s.toggle_mark("strong").unwrap();
        assert_eq!(s.tree()[0].as_text().unwrap().children.len(), 1);
        assert!(!s.is_mark_active("strong"));
    }

    #[test]
    fn test_collapsed_toggle_mark_applies_to_next_text() {
        let mut s = session(two_blocks());
        s.select(caret(0, 0, 5)).unwrap();
        s.toggle_mark("em").unwrap();
        assert!(s.is_mark_active("em"));
        s.insert_text("!").unwrap();

        let block = s.tree()[0].as_text().unwrap();
        assert_eq!(block.children.len(), 3);
        assert_eq!(block.children[1].as_text().unwrap().marks, vec!["em".to_string()]);
        assert_eq!(block.text(), "Hello! world");
    }

    #[test]
    fn test_block_style_and_list_toggles() {
        let mut s = session(two_blocks());
        s.select(Some(Range::new(Point::new(0, 0, 0), Point::new(1, 0, 2)))).unwrap();
        s.toggle_block_style("h1").unwrap();
        assert!(s.tree().iter().all(|b| b.as_text().unwrap().style.as_deref() == Some("h1")));
        s.toggle_block_style("h1").unwrap();
        assert!(s.tree().iter().all(|b| b.as_text().unwrap().style.as_deref() == Some("normal")));

        s.toggle_list("bullet").unwrap();
        let first = s.tree()[0].as_text().unwrap();
        assert_eq!(first.list_item.as_deref(), Some("bullet"));
        assert_eq!(first.level, Some(1));
        s.toggle_list("bullet").unwrap();
        assert_eq!(s.tree()[0].as_text().unwrap().list_item, None);
    }

    #[test]
    fn test_insert_break_and_join() {
        let mut s = session(two_blocks());
        s.select(caret(0, 0, 5)).unwrap();
        s.insert_break().unwrap();
        assert_eq!(texts(&s), vec!["Hello", " world", "Second"]);
        assert_eq!(s.selection(), caret(1, 0, 0).as_ref());

        s.delete_backward().unwrap();
        assert_eq!(texts(&s), vec!["Hello world", "Second"]);
        assert_eq!(s.selection(), caret(0, 0, 5).as_ref());
    }

    #[test]
    fn test_break_at_end_starts_an_empty_block() {
        let mut s = session(two_blocks());
        s.select(caret(1, 0, 6)).unwrap();
        s.insert_break().unwrap();
        assert_eq!(texts(&s), vec!["Hello world", "Second", ""]);
        s.insert_text("x").unwrap();
        assert_eq!(texts(&s)[2], "x");
    }

    #[test]
    fn test_delete_across_blocks() {
        let mut s = session(two_blocks());
        s.select(Some(Range::new(Point::new(0, 0, 5), Point::new(1, 0, 3)))).unwrap();
        s.delete_backward().unwrap();
        assert_eq!(texts(&s), vec!["Helloond"]);
        assert_eq!(s.selection(), caret(0, 0, 5).as_ref());
    }

    #[test]
    fn test_insert_block_and_child() {
        let mut s = session(two_blocks());
        s.select(caret(0, 0, 5)).unwrap();
        let path = s
            .insert_block("image", Some(json!({"src": "x.png"}).as_object().unwrap().clone()))
            .unwrap();
        assert_eq!(s.tree()[1].node_type(), "image");
        assert_eq!(s.find_by_path(&path).map(|(_, p)| p), Some(path.clone()));

        s.select(caret(0, 0, 5)).unwrap();
        let child = s.insert_child("mention", None).unwrap();
        let (entity, _) = s.find_by_path(&child).unwrap();
        assert!(matches!(entity, Entity::Child(Child::Object(_))));
        assert_eq!(s.tree()[0].as_text().unwrap().children.len(), 3);
    }

    #[test]
    fn test_annotations() {
        let mut s = session(two_blocks());
        s.select(Some(Range::new(Point::new(0, 0, 0), Point::new(0, 0, 5)))).unwrap();
        let paths = s
            .add_annotation("link", Some(json!({"href": "https://example.com"}).as_object().unwrap().clone()))
            .unwrap()
            .unwrap();
        assert_eq!(paths.span_path, Path::child("a", "a1"));

        let active = s.active_annotations();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].def_type, "link");

        s.remove_annotation().unwrap();
        assert!(s.active_annotations().is_empty());
        let block = s.tree()[0].as_text().unwrap();
        assert!(block.mark_defs.is_empty());
        assert_eq!(block.children.len(), 1);
    }

    #[test]
    fn test_collapsed_annotation_is_none() {
        let mut s = session(two_blocks());
        s.select(caret(0, 0, 2)).unwrap();
        assert_eq!(s.add_annotation("link", None).unwrap(), None);
    }

    #[test]
    fn test_focus_block_and_child() {
        let mut s = session(two_blocks());
        assert!(s.focus_block().is_none());
        s.select(caret(1, 0, 1)).unwrap();
        assert_eq!(s.focus_block().map(|b| b.key().to_string()), Some("b".to_string()));
        assert_eq!(s.focus_child().map(|c| c.key().to_string()), Some("b1".to_string()));
    }

    #[test]
    fn test_find_by_missing_path() {
        let s = session(two_blocks());
        assert!(s.find_by_path(&Path::block("zz")).is_none());
        let (_, resolved) = s.find_by_path(&Path(vec![PathSegment::index(1)])).unwrap();
        assert_eq!(resolved, Path::block("b"));
    }

    #[test]
    fn test_commands_without_selection_fail() {
        let mut s = session(two_blocks());
        assert!(matches!(s.toggle_mark("strong"), Err(EditorError::NoSelection)));
        assert!(matches!(s.insert_text("x"), Err(EditorError::NoSelection)));
    }
}
