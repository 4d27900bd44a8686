//! Block normalization after local edits.
//!
//! Each call returns at most one operation; the session applies it and asks
//! again until the block is settled, so every step is recorded and
//! translated like any other edit.

use crate::errors::OperationResult;
use crate::node::{EditorBlock, Inline, Node, TextLeaf};
use crate::operations::{Operation, Properties};
use folio_model::KeyGenerator;
use serde_json::Value as Json;
use std::collections::HashSet;
use std::sync::Arc;

/// Next fix for block `index`, if it needs one
pub fn next_operation(
    tree: &[Arc<EditorBlock>],
    index: usize,
    keys: &mut KeyGenerator,
) -> OperationResult<Option<Operation>> {
    let Some(EditorBlock::Text(element)) = tree.get(index).map(Arc::as_ref) else {
        return Ok(None);
    };

    if element.children.is_empty() {
        return Ok(Some(Operation::InsertNode {
            path: vec![index, 0],
            node: Node::Inline(Inline::Text(TextLeaf::new(keys.new_key(), "", Vec::new()))),
        }));
    }

    if element.children.len() > 1 {
        if let Some(c) = element
            .children
            .iter()
            .position(|child| child.as_text().is_some_and(TextLeaf::is_empty))
        {
            return Ok(Some(Operation::RemoveNode {
                path: vec![index, c],
                node: Node::Inline(element.children[c].clone()),
            }));
        }
    }

    let mergeable = element.children.windows(2).position(|pair| match (&pair[0], &pair[1]) {
        (Inline::Text(left), Inline::Text(right)) => left.same_marks(right),
        _ => false,
    });
    if let Some(c) = mergeable {
        return Operation::merge(tree, &[index, c + 1]).map(Some);
    }

    let used: HashSet<&str> = element
        .children
        .iter()
        .filter_map(Inline::as_text)
        .flat_map(|leaf| leaf.marks.iter().map(String::as_str))
        .collect();
    if element.mark_defs.iter().any(|def| !used.contains(def.key.as_str())) {
        let kept: Vec<_> = element
            .mark_defs
            .iter()
            .filter(|def| used.contains(def.key.as_str()))
            .cloned()
            .collect();
        let mut properties = Properties::new();
        properties.insert(
            "markDefs".into(),
            serde_json::to_value(kept).unwrap_or_else(|_| Json::Array(Vec::new())),
        );
        return Operation::set_node(tree, &[index], properties).map(Some);
    }

    Ok(None)
}
