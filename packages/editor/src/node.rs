//! # Editor model
//!
//! In-memory tree manipulated by edit operations. Blocks are shared behind
//! `Arc` so a snapshot of the tree is a cheap vector clone; mutation goes
//! through `Arc::make_mut`, which only copies the block being touched.
//!
//! Object blocks and inline objects become void nodes carrying their
//! original payload, so conversion back to the document model is exact. A
//! void node has a single implicit empty text child; points inside it use
//! child index 0 and offset 0.

use folio_model::{MarkDef, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::sync::Arc;

/// Text run inside a text element
#[derive(Debug, Clone, PartialEq)]
pub struct TextLeaf {
    pub key: String,
    pub text: String,
    pub marks: Vec<String>,
}

impl TextLeaf {
    pub fn new(key: impl Into<String>, text: impl Into<String>, marks: Vec<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
            marks,
        }
    }

    /// Length in chars
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn has_mark(&self, mark: &str) -> bool {
        self.marks.iter().any(|m| m == mark)
    }

    /// Marks compared as a set
    pub fn same_marks(&self, other: &TextLeaf) -> bool {
        let mut a = self.marks.clone();
        let mut b = other.marks.clone();
        a.sort();
        a.dedup();
        b.sort();
        b.dedup();
        a == b
    }
}

/// Opaque object wrapped for the editor, either block-level or inline
#[derive(Debug, Clone, PartialEq)]
pub struct VoidNode {
    pub key: String,
    pub node_type: String,
    /// Original payload without `_key` and `_type`
    pub value: Map<String, Json>,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(TextLeaf),
    Void(VoidNode),
}

impl Inline {
    pub fn key(&self) -> &str {
        match self {
            Inline::Text(t) => &t.key,
            Inline::Void(v) => &v.key,
        }
    }

    pub fn as_text(&self) -> Option<&TextLeaf> {
        match self {
            Inline::Text(t) => Some(t),
            Inline::Void(_) => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextLeaf> {
        match self {
            Inline::Text(t) => Some(t),
            Inline::Void(_) => None,
        }
    }

    /// Offset range of the node; voids are zero width
    pub fn text_len(&self) -> usize {
        self.as_text().map(TextLeaf::len).unwrap_or(0)
    }
}

/// Text block in editor form
#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    pub key: String,
    pub block_type: String,
    pub style: Option<String>,
    pub list_item: Option<String>,
    pub level: Option<u32>,
    pub mark_defs: Vec<MarkDef>,
    pub fields: Map<String, Json>,
    pub children: Vec<Inline>,
}

impl TextElement {
    pub fn find_child(&self, key: &str) -> Option<usize> {
        self.children.iter().position(|c| c.key() == key)
    }

    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(Inline::as_text)
            .map(|t| t.text.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorBlock {
    Text(TextElement),
    Void(VoidNode),
}

impl EditorBlock {
    pub fn key(&self) -> &str {
        match self {
            EditorBlock::Text(t) => &t.key,
            EditorBlock::Void(v) => &v.key,
        }
    }

    pub fn node_type(&self) -> &str {
        match self {
            EditorBlock::Text(t) => &t.block_type,
            EditorBlock::Void(v) => &v.node_type,
        }
    }

    pub fn as_text(&self) -> Option<&TextElement> {
        match self {
            EditorBlock::Text(t) => Some(t),
            EditorBlock::Void(_) => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextElement> {
        match self {
            EditorBlock::Text(t) => Some(t),
            EditorBlock::Void(_) => None,
        }
    }
}

/// Node carried by insert and remove operations
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Block(EditorBlock),
    Inline(Inline),
}

impl Node {
    pub fn key(&self) -> &str {
        match self {
            Node::Block(b) => b.key(),
            Node::Inline(i) => i.key(),
        }
    }
}

pub type EditorTree = Vec<Arc<EditorBlock>>;

/// Index-addressed position: `path` is `[block, child]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    pub path: Vec<usize>,
    pub offset: usize,
}

impl Point {
    pub fn new(block: usize, child: usize, offset: usize) -> Self {
        Self {
            path: vec![block, child],
            offset,
        }
    }

    pub fn block(&self) -> usize {
        self.path.first().copied().unwrap_or(0)
    }

    pub fn child(&self) -> usize {
        self.path.get(1).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub anchor: Point,
    pub focus: Point,
}

impl Range {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_backward(&self) -> bool {
        self.focus < self.anchor
    }

    pub fn start(&self) -> &Point {
        if self.is_backward() {
            &self.focus
        } else {
            &self.anchor
        }
    }

    pub fn end(&self) -> &Point {
        if self.is_backward() {
            &self.anchor
        } else {
            &self.focus
        }
    }
}

pub type Selection = Option<Range>;

/// Empty text block holding one empty span
pub fn placeholder_block(block_key: String, span_key: String, schema: &Schema) -> EditorBlock {
    EditorBlock::Text(TextElement {
        key: block_key,
        block_type: schema.block_type.clone(),
        style: Some(schema.default_style.clone()),
        list_item: None,
        level: None,
        mark_defs: Vec::new(),
        fields: Map::new(),
        children: vec![Inline::Text(TextLeaf::new(span_key, "", Vec::new()))],
    })
}

/// One text block with default style holding a single empty unmarked span.
///
/// The document model represents this state as an absent value.
pub fn is_empty_tree(tree: &[Arc<EditorBlock>], schema: &Schema) -> bool {
    let [block] = tree else {
        return false;
    };
    let Some(text) = block.as_text() else {
        return false;
    };
    let default_style = text.style.as_deref().map_or(true, |s| s == schema.default_style);
    let empty_span = matches!(
        text.children.as_slice(),
        [Inline::Text(leaf)] if leaf.text.is_empty() && leaf.marks.is_empty()
    );
    text.block_type == schema.block_type
        && default_style
        && empty_span
        && text.list_item.is_none()
        && text.level.is_none()
        && text.mark_defs.is_empty()
        && text.fields.is_empty()
}

pub fn inline_at<'a>(tree: &'a [Arc<EditorBlock>], block: usize, child: usize) -> Option<&'a Inline> {
    tree.get(block)?.as_text()?.children.get(child)
}

pub fn leaf_at<'a>(tree: &'a [Arc<EditorBlock>], point: &Point) -> Option<&'a TextLeaf> {
    inline_at(tree, point.block(), point.child())?.as_text()
}

/// Last position inside block `index`
pub fn end_of_block(tree: &[Arc<EditorBlock>], index: usize) -> Point {
    match tree.get(index).and_then(|b| b.as_text()) {
        Some(text) if !text.children.is_empty() => {
            let child = text.children.len() - 1;
            Point::new(index, child, text.children[child].text_len())
        }
        _ => Point::new(index, 0, 0),
    }
}

/// Pull a point back inside the tree
pub fn clamp_point(tree: &[Arc<EditorBlock>], point: &Point) -> Point {
    if tree.is_empty() {
        return Point::new(0, 0, 0);
    }
    let block = point.block().min(tree.len() - 1);
    match tree[block].as_ref() {
        EditorBlock::Void(_) => Point::new(block, 0, 0),
        EditorBlock::Text(text) => {
            if text.children.is_empty() {
                return Point::new(block, 0, 0);
            }
            let child = point.child().min(text.children.len() - 1);
            let offset = point.offset.min(text.children[child].text_len());
            Point::new(block, child, offset)
        }
    }
}

pub fn clamp_range(tree: &[Arc<EditorBlock>], range: &Range) -> Range {
    Range::new(clamp_point(tree, &range.anchor), clamp_point(tree, &range.focus))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_block(key: &str, spans: &[(&str, &str)]) -> Arc<EditorBlock> {
        Arc::new(EditorBlock::Text(TextElement {
            key: key.to_string(),
            block_type: "block".to_string(),
            style: Some("normal".to_string()),
            list_item: None,
            level: None,
            mark_defs: Vec::new(),
            fields: Map::new(),
            children: spans
                .iter()
                .map(|(k, t)| Inline::Text(TextLeaf::new(*k, *t, Vec::new())))
                .collect(),
        }))
    }

    #[test]
    fn test_empty_tree_detection() {
        let schema = Schema::default();
        let tree = vec![Arc::new(placeholder_block("a".into(), "s".into(), &schema))];
        assert!(is_empty_tree(&tree, &schema));

        let tree = vec![text_block("a", &[("s", "x")])];
        assert!(!is_empty_tree(&tree, &schema));

        let tree = vec![text_block("a", &[("s", "")]), text_block("b", &[("t", "")])];
        assert!(!is_empty_tree(&tree, &schema));
    }

    #[test]
    fn test_clamp_point() {
        let tree = vec![text_block("a", &[("s1", "Hello"), ("s2", "!")])];
        assert_eq!(clamp_point(&tree, &Point::new(3, 7, 40)), Point::new(0, 1, 1));
        assert_eq!(clamp_point(&tree, &Point::new(0, 0, 3)), Point::new(0, 0, 3));
    }

    #[test]
    fn test_range_direction() {
        let range = Range::new(Point::new(1, 0, 2), Point::new(0, 3, 0));
        assert!(range.is_backward());
        assert_eq!(range.start(), &Point::new(0, 3, 0));
        assert_eq!(range.end(), &Point::new(1, 0, 2));
    }

    #[test]
    fn test_same_marks_ignores_order() {
        let a = TextLeaf::new("a", "", vec!["strong".into(), "em".into()]);
        let b = TextLeaf::new("b", "", vec!["em".into(), "strong".into()]);
        assert!(a.same_marks(&b));
    }
}
