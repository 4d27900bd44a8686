//! # Operation → patch translation
//!
//! Derives the patches equivalent to one applied operation from the tree
//! before and after it. Patches address blocks and children by key so they
//! stay valid when a consumer's copy has been reordered concurrently.
//!
//! The document model represents the empty editor (one empty text block) as
//! an absent value, so a batch leaving that state starts with
//! `setIfMissing(<placeholder>, [])` and a batch entering it ends with
//! `unset([])`.

use crate::convert::{block_json, inline_json, tree_json};
use crate::errors::{EditorError, OperationError};
use crate::node::{is_empty_tree, EditorBlock, Inline, TextElement};
use crate::operations::Operation;
use folio_model::patch::{insert, set, set_if_missing, unset};
use folio_model::{apply_all_json, InsertPosition, Patch, Path, PathSegment, Schema};
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::error;

fn block<'a>(tree: &'a [Arc<EditorBlock>], index: usize) -> Result<&'a EditorBlock, OperationError> {
    tree.get(index)
        .map(|b| b.as_ref())
        .ok_or(OperationError::NodeNotFound(vec![index]))
}

fn element<'a>(tree: &'a [Arc<EditorBlock>], index: usize) -> Result<&'a TextElement, OperationError> {
    block(tree, index)?
        .as_text()
        .ok_or(OperationError::NotTextBlock(vec![index]))
}

fn inline<'a>(tree: &'a [Arc<EditorBlock>], b: usize, c: usize) -> Result<&'a Inline, OperationError> {
    element(tree, b)?
        .children
        .get(c)
        .ok_or(OperationError::NodeNotFound(vec![b, c]))
}

fn text_path(tree: &[Arc<EditorBlock>], b: usize, c: usize) -> Result<Path, OperationError> {
    Ok(Path::child(block(tree, b)?.key(), inline(tree, b, c)?.key()).with("text"))
}

/// Insert `items` so they land at block `index` of `after`
fn block_insert(after: &[Arc<EditorBlock>], index: usize, items: Vec<Json>) -> Patch {
    if index > 0 {
        if let Some(prev) = after.get(index - 1) {
            return insert(items, InsertPosition::After, Path::block(prev.key()));
        }
    }
    match after.get(index + 1) {
        Some(next) => insert(items, InsertPosition::Before, Path::block(next.key())),
        None => insert(items, InsertPosition::Before, Path::from(vec![PathSegment::index(0)])),
    }
}

/// Insert `items` so they land at child `index` of `parent`
fn child_insert(parent: &TextElement, index: usize, items: Vec<Json>) -> Patch {
    if index > 0 {
        if let Some(prev) = parent.children.get(index - 1) {
            return insert(items, InsertPosition::After, Path::child(&parent.key, prev.key()));
        }
    }
    match parent.children.get(index + 1) {
        Some(next) => insert(items, InsertPosition::Before, Path::child(&parent.key, next.key())),
        None => insert(items, InsertPosition::Before, Path::block(&parent.key).with("children")),
    }
}

/// Patches equivalent to `op`, which turned `before` into `after`
pub fn translate(
    op: &Operation,
    before: &[Arc<EditorBlock>],
    after: &[Arc<EditorBlock>],
    schema: &Schema,
) -> Result<Vec<Patch>, EditorError> {
    let mut patches = match op {
        Operation::InsertText { path, .. } | Operation::RemoveText { path, .. } => {
            let [b, c] = path.as_slice() else {
                return Err(OperationError::InvalidPath(path.clone()).into());
            };
            let leaf = inline(after, *b, *c)?
                .as_text()
                .ok_or_else(|| OperationError::NotText(path.clone()))?;
            vec![set(leaf.text.clone(), text_path(after, *b, *c)?)]
        }

        Operation::InsertNode { path, .. } => match path.as_slice() {
            [b] => vec![block_insert(after, *b, vec![block_json(block(after, *b)?, schema)?])],
            [b, c] => {
                let parent = element(after, *b)?;
                let item = inline_json(inline(after, *b, *c)?, &parent.key, schema)?;
                vec![child_insert(parent, *c, vec![item])]
            }
            _ => return Err(OperationError::InvalidPath(path.clone()).into()),
        },

        Operation::RemoveNode { path, .. } => match path.as_slice() {
            [b] => vec![unset(Path::block(block(before, *b)?.key()))],
            [b, c] => vec![unset(Path::child(block(before, *b)?.key(), inline(before, *b, *c)?.key()))],
            _ => return Err(OperationError::InvalidPath(path.clone()).into()),
        },

        Operation::SplitNode { path, .. } => match path.as_slice() {
            [b] => {
                let left = block(after, *b)?;
                vec![
                    set(block_json(left, schema)?, Path::block(left.key())),
                    insert(
                        vec![block_json(block(after, b + 1)?, schema)?],
                        InsertPosition::After,
                        Path::block(left.key()),
                    ),
                ]
            }
            [b, c] => {
                let parent = element(after, *b)?;
                let left = inline(after, *b, *c)?
                    .as_text()
                    .ok_or_else(|| OperationError::NotText(path.clone()))?;
                vec![
                    set(left.text.clone(), text_path(after, *b, *c)?),
                    insert(
                        vec![inline_json(inline(after, *b, c + 1)?, &parent.key, schema)?],
                        InsertPosition::After,
                        Path::child(&parent.key, &left.key),
                    ),
                ]
            }
            _ => return Err(OperationError::InvalidPath(path.clone()).into()),
        },

        Operation::MergeNode { path, .. } => match path.as_slice() {
            [b] if *b > 0 => {
                let survivor = block(after, b - 1)?;
                vec![
                    unset(Path::block(block(before, *b)?.key())),
                    set(block_json(survivor, schema)?, Path::block(survivor.key())),
                ]
            }
            [b, c] if *c > 0 => {
                let parent = element(after, *b)?;
                let survivor = inline(after, *b, c - 1)?;
                vec![
                    unset(Path::child(&parent.key, inline(before, *b, *c)?.key())),
                    set(
                        inline_json(survivor, &parent.key, schema)?,
                        Path::child(&parent.key, survivor.key()),
                    ),
                ]
            }
            _ => return Err(OperationError::CannotMerge(path.clone()).into()),
        },

        Operation::MoveNode { path, new_path } => match (path.as_slice(), new_path.as_slice()) {
            ([from], [to]) => vec![
                unset(Path::block(block(before, *from)?.key())),
                block_insert(after, *to, vec![block_json(block(after, *to)?, schema)?]),
            ],
            ([fb, fc], [tb, tc]) => {
                let parent = element(after, *tb)?;
                let item = inline_json(inline(after, *tb, *tc)?, &parent.key, schema)?;
                vec![
                    unset(Path::child(block(before, *fb)?.key(), inline(before, *fb, *fc)?.key())),
                    child_insert(parent, *tc, vec![item]),
                ]
            }
            _ => return Err(OperationError::InvalidPath(new_path.clone()).into()),
        },

        Operation::SetNode { path, .. } => match path.as_slice() {
            [b] => vec![set(block_json(block(after, *b)?, schema)?, Path::block(block(before, *b)?.key()))],
            [b, c] => {
                let parent = element(after, *b)?;
                vec![set(
                    inline_json(inline(after, *b, *c)?, &parent.key, schema)?,
                    Path::child(block(before, *b)?.key(), inline(before, *b, *c)?.key()),
                )]
            }
            _ => return Err(OperationError::InvalidPath(path.clone()).into()),
        },

        Operation::SetSelection { .. } => Vec::new(),
    };

    if patches.is_empty() {
        return Ok(patches);
    }
    if is_empty_tree(before, schema) {
        patches.insert(0, set_if_missing(tree_json(before, schema)?, Path::root()));
    }
    if is_empty_tree(after, schema) {
        patches.push(unset(Path::root()));
    }
    Ok(patches)
}

/// Document value a tree stands for: `None` when the tree is empty
pub fn document_json(tree: &[Arc<EditorBlock>], schema: &Schema) -> Result<Option<Json>, EditorError> {
    if is_empty_tree(tree, schema) {
        return Ok(None);
    }
    Ok(Some(tree_json(tree, schema)?))
}

/// Replay `patches` on the document value of `before` and compare with `after`.
///
/// A mismatch is logged with full dumps and reported as `false`.
pub fn verify(
    op: &Operation,
    before: &[Arc<EditorBlock>],
    after: &[Arc<EditorBlock>],
    patches: &[Patch],
    schema: &Schema,
) -> Result<bool, EditorError> {
    let start = document_json(before, schema)?;
    let expected = document_json(after, schema)?;
    let outcome = apply_all_json(start.clone(), patches);

    if outcome.failures.is_empty() && outcome.value == expected {
        return Ok(true);
    }

    let dump = |value: &Option<Json>| value.as_ref().map(Json::to_string).unwrap_or_else(|| "<none>".into());
    error!(
        operation = op.name(),
        before = %dump(&start),
        after = %dump(&expected),
        actual = %dump(&outcome.value),
        patches = %serde_json::to_string(patches).unwrap_or_default(),
        failures = outcome.failures.len(),
        "Translated patches do not reproduce the editor tree"
    );
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{placeholder_block, EditorTree, Node, TextLeaf, VoidNode};
    use crate::operations::Properties;
    use serde_json::{json, Map};

    fn leaf(key: &str, text: &str) -> Inline {
        Inline::Text(TextLeaf::new(key, text, Vec::new()))
    }

    fn text_block(key: &str, children: Vec<Inline>) -> EditorBlock {
        EditorBlock::Text(TextElement {
            key: key.to_string(),
            block_type: "block".to_string(),
            style: Some("normal".to_string()),
            list_item: None,
            level: None,
            mark_defs: Vec::new(),
            fields: Map::new(),
            children,
        })
    }

    fn tree() -> EditorTree {
        vec![
            Arc::new(text_block("a", vec![leaf("s1", "Hello")])),
            Arc::new(text_block("b", vec![leaf("s2", "big"), leaf("s3", " world")])),
            Arc::new(EditorBlock::Void(VoidNode {
                key: "img".into(),
                node_type: "image".into(),
                value: Map::new(),
                inline: false,
            })),
        ]
    }

    fn translate_and_verify(op: Operation, before: EditorTree) -> Vec<Patch> {
        let schema = Schema::default();
        let mut after = before.clone();
        op.apply(&mut after).unwrap();
        let patches = translate(&op, &before, &after, &schema).unwrap();
        assert!(
            verify(&op, &before, &after, &patches, &schema).unwrap(),
            "{} patches do not reproduce the tree: {:?}",
            op.name(),
            patches
        );
        patches
    }

    #[test]
    fn test_insert_text_scenario() {
        let before = vec![Arc::new(text_block("a", vec![leaf("s1", "Hello")]))];
        let patches = translate_and_verify(
            Operation::InsertText {
                path: vec![0, 0],
                offset: 5,
                text: " world".into(),
            },
            before,
        );
        assert_eq!(patches, vec![set("Hello world", Path::child("a", "s1").with("text"))]);
    }

    #[test]
    fn test_every_operation_reproduces_the_tree() {
        let t = tree();
        let ops = vec![
            Operation::RemoveText {
                path: vec![1, 1],
                offset: 0,
                text: " ".into(),
            },
            Operation::InsertNode {
                path: vec![0],
                node: Node::Block(text_block("n", vec![leaf("n1", "new")])),
            },
            Operation::InsertNode {
                path: vec![3],
                node: Node::Block(text_block("n", vec![leaf("n1", "end")])),
            },
            Operation::InsertNode {
                path: vec![1, 1],
                node: Node::Inline(leaf("n1", "mid")),
            },
            Operation::InsertNode {
                path: vec![0, 0],
                node: Node::Inline(leaf("n1", "first")),
            },
            Operation::RemoveNode {
                path: vec![2],
                node: Node::Block(t[2].as_ref().clone()),
            },
            Operation::RemoveNode {
                path: vec![1, 0],
                node: Node::Inline(leaf("s2", "big")),
            },
            Operation::split(&t, &[0, 0], 2, "x".into()).unwrap(),
            Operation::split(&t, &[1], 1, "x".into()).unwrap(),
            Operation::merge(&t, &[1, 1]).unwrap(),
            Operation::merge(&t, &[1]).unwrap(),
            Operation::MoveNode {
                path: vec![0],
                new_path: vec![2],
            },
            Operation::MoveNode {
                path: vec![2],
                new_path: vec![0],
            },
            Operation::MoveNode {
                path: vec![1, 0],
                new_path: vec![0, 1],
            },
            Operation::set_node(&t, &[1], {
                let mut p = Properties::new();
                p.insert("style".into(), json!("h2"));
                p
            })
            .unwrap(),
            Operation::set_node(&t, &[1, 0], {
                let mut p = Properties::new();
                p.insert("marks".into(), json!(["strong"]));
                p
            })
            .unwrap(),
        ];

        for op in ops {
            translate_and_verify(op, t.clone());
        }
    }

    #[test]
    fn test_leaving_empty_state_prepends_set_if_missing() {
        let schema = Schema::default();
        let before = vec![Arc::new(placeholder_block("a".into(), "s".into(), &schema))];
        let patches = translate_and_verify(
            Operation::InsertText {
                path: vec![0, 0],
                offset: 0,
                text: "H".into(),
            },
            before.clone(),
        );
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0], set_if_missing(tree_json(&before, &schema).unwrap(), Path::root()));
        assert_eq!(patches[1], set("H", Path::child("a", "s").with("text")));
    }

    #[test]
    fn test_entering_empty_state_appends_unset() {
        let before = vec![Arc::new(text_block("a", vec![leaf("s", "H")]))];
        let patches = translate_and_verify(
            Operation::RemoveText {
                path: vec![0, 0],
                offset: 0,
                text: "H".into(),
            },
            before,
        );
        assert_eq!(patches.last(), Some(&unset(Path::root())));
    }

    #[test]
    fn test_selection_has_no_patches() {
        let t = tree();
        let op = Operation::SetSelection {
            properties: None,
            new_properties: None,
        };
        assert!(translate(&op, &t, &t, &Schema::default()).unwrap().is_empty());
    }
}
