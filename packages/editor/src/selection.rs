//! # Selection mapping
//!
//! Converts between index-addressed ranges used by operations and
//! key-addressed ranges exchanged on the change bus. Keyed ranges survive
//! structural edits; index ranges do not.

use crate::node::{EditorBlock, Point, Range};
use folio_model::Path;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedPoint {
    pub path: Path,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedRange {
    pub anchor: KeyedPoint,
    pub focus: KeyedPoint,
    pub backward: bool,
}

pub fn to_stable_point(point: &Point, tree: &[Arc<EditorBlock>]) -> Option<KeyedPoint> {
    match tree.get(point.block())?.as_ref() {
        EditorBlock::Void(void) => Some(KeyedPoint {
            path: Path::block(&void.key),
            offset: 0,
        }),
        EditorBlock::Text(text) => {
            let child = text.children.get(point.child())?;
            Some(KeyedPoint {
                path: Path::child(&text.key, child.key()),
                offset: point.offset.min(child.text_len()),
            })
        }
    }
}

/// `None` when an index does not resolve
pub fn to_stable_range(range: &Range, tree: &[Arc<EditorBlock>]) -> Option<KeyedRange> {
    Some(KeyedRange {
        anchor: to_stable_point(&range.anchor, tree)?,
        focus: to_stable_point(&range.focus, tree)?,
        backward: range.is_backward(),
    })
}

pub fn to_index_point(point: &KeyedPoint, tree: &[Arc<EditorBlock>]) -> Option<Point> {
    let block_key = point.path.block_key()?;
    let (index, block) = tree.iter().enumerate().find(|(_, b)| b.key() == block_key)?;
    match block.as_ref() {
        EditorBlock::Void(_) => Some(Point::new(index, 0, 0)),
        EditorBlock::Text(text) => match point.path.child_key() {
            None => Some(Point::new(index, 0, 0)),
            Some(child_key) => {
                let child = text.find_child(child_key)?;
                let offset = point.offset.min(text.children[child].text_len());
                Some(Point::new(index, child, offset))
            }
        },
    }
}

/// `None` when a referenced key no longer exists; offsets are clamped
pub fn to_index_range(range: &KeyedRange, tree: &[Arc<EditorBlock>]) -> Option<Range> {
    Some(Range::new(to_index_point(&range.anchor, tree)?, to_index_point(&range.focus, tree)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Inline, TextElement, TextLeaf, VoidNode};
    use serde_json::Map;

    fn tree() -> Vec<Arc<EditorBlock>> {
        vec![
            Arc::new(EditorBlock::Text(TextElement {
                key: "a".into(),
                block_type: "block".into(),
                style: None,
                list_item: None,
                level: None,
                mark_defs: Vec::new(),
                fields: Map::new(),
                children: vec![
                    Inline::Text(TextLeaf::new("s1", "Hello", Vec::new())),
                    Inline::Text(TextLeaf::new("s2", " there", vec!["strong".into()])),
                ],
            })),
            Arc::new(EditorBlock::Void(VoidNode {
                key: "img".into(),
                node_type: "image".into(),
                value: Map::new(),
                inline: false,
            })),
        ]
    }

    #[test]
    fn test_round_trip() {
        let t = tree();
        let range = Range::new(Point::new(0, 1, 3), Point::new(0, 0, 2));
        let keyed = to_stable_range(&range, &t).unwrap();
        assert!(keyed.backward);
        assert_eq!(keyed.anchor.path, Path::child("a", "s2"));
        assert_eq!(to_index_range(&keyed, &t).unwrap(), range);
    }

    #[test]
    fn test_void_block_point() {
        let t = tree();
        let keyed = to_stable_point(&Point::new(1, 0, 0), &t).unwrap();
        assert_eq!(keyed.path, Path::block("img"));
        assert_eq!(to_index_point(&keyed, &t), Some(Point::new(1, 0, 0)));
    }

    #[test]
    fn test_out_of_range_index_is_none() {
        let t = tree();
        assert!(to_stable_range(&Range::collapsed(Point::new(5, 0, 0)), &t).is_none());
        assert!(to_stable_range(&Range::collapsed(Point::new(0, 9, 0)), &t).is_none());
    }

    #[test]
    fn test_deleted_key_is_none_and_offsets_clamp() {
        let t = tree();
        let gone = KeyedPoint {
            path: Path::child("a", "deleted"),
            offset: 0,
        };
        assert_eq!(to_index_point(&gone, &t), None);

        let stale = KeyedPoint {
            path: Path::child("a", "s1"),
            offset: 40,
        };
        assert_eq!(to_index_point(&stale, &t), Some(Point::new(0, 0, 5)));
    }
}
