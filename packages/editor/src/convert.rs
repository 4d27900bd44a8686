//! # Value conversion
//!
//! Maps document-model blocks to editor blocks and back. Object blocks and
//! inline objects are wrapped as void nodes holding their payload.
//!
//! Both directions consult an [`IdentityCache`]: when the freshly converted
//! block is deeply equal to the one produced for the same key last time, the
//! previous `Arc` is returned so consumers can detect "unchanged" with
//! `Arc::ptr_eq`. Document children are cached the same way per
//! `(block key, child key)`, so an untouched span keeps its reference even
//! when a sibling changed.

use crate::errors::ConvertError;
use crate::node::{EditorBlock, Inline, TextElement, TextLeaf, VoidNode};
use folio_model::{Block, Child, InlineObject, ObjectBlock, Schema, Span, TextBlock};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

/// Session-scoped key → last produced node maps
#[derive(Debug, Default, Clone)]
pub struct IdentityCache {
    editor: HashMap<String, Arc<EditorBlock>>,
    document: HashMap<String, Arc<Block>>,
    children: HashMap<(String, String), Arc<Child>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.editor.clear();
        self.document.clear();
        self.children.clear();
    }
}

pub fn inline_to_internal(child: &Child) -> Inline {
    match child {
        Child::Span(span) => Inline::Text(TextLeaf::new(span.key.clone(), span.text.clone(), span.marks.clone())),
        Child::Object(object) => Inline::Void(VoidNode {
            key: object.key.clone(),
            node_type: object.object_type.clone(),
            value: object.fields.clone(),
            inline: true,
        }),
    }
}

pub fn block_to_internal(block: &Block) -> EditorBlock {
    match block {
        Block::Text(text) => EditorBlock::Text(TextElement {
            key: text.key.clone(),
            block_type: text.block_type.clone(),
            style: text.style.clone(),
            list_item: text.list_item.clone(),
            level: text.level,
            mark_defs: text.mark_defs.clone(),
            fields: text.fields.clone(),
            children: text.children.iter().map(|c| inline_to_internal(c)).collect(),
        }),
        Block::Object(object) => EditorBlock::Void(VoidNode {
            key: object.key.clone(),
            node_type: object.block_type.clone(),
            value: object.fields.clone(),
            inline: false,
        }),
    }
}

pub fn inline_from_internal(inline: &Inline, block_key: &str, schema: &Schema) -> Result<Child, ConvertError> {
    match inline {
        Inline::Text(leaf) => Ok(Child::Span(Span {
            key: leaf.key.clone(),
            span_type: schema.span_type.clone(),
            text: leaf.text.clone(),
            marks: leaf.marks.clone(),
        })),
        Inline::Void(void) if void.inline => Ok(Child::Object(InlineObject {
            key: void.key.clone(),
            object_type: void.node_type.clone(),
            fields: void.value.clone(),
        })),
        Inline::Void(void) => Err(ConvertError::NotAValidChild {
            block_key: block_key.to_string(),
            key: void.key.clone(),
        }),
    }
}

pub fn block_from_internal(block: &EditorBlock, schema: &Schema) -> Result<Block, ConvertError> {
    match block {
        EditorBlock::Text(text) => Ok(Block::Text(TextBlock {
            key: text.key.clone(),
            block_type: text.block_type.clone(),
            style: text.style.clone(),
            list_item: text.list_item.clone(),
            level: text.level,
            mark_defs: text.mark_defs.clone(),
            children: text
                .children
                .iter()
                .map(|c| inline_from_internal(c, &text.key, schema).map(Arc::new))
                .collect::<Result<_, _>>()?,
            fields: text.fields.clone(),
        })),
        EditorBlock::Void(void) if !void.inline => Ok(Block::Object(ObjectBlock {
            key: void.key.clone(),
            block_type: void.node_type.clone(),
            fields: void.value.clone(),
        })),
        EditorBlock::Void(void) => Err(ConvertError::NotAValidBlock { key: void.key.clone() }),
    }
}

/// Document value → editor tree. `None` maps to an empty tree.
pub fn to_internal(value: Option<&[Arc<Block>]>, cache: &mut IdentityCache) -> Vec<Arc<EditorBlock>> {
    let blocks = value.unwrap_or_default();
    let tree: Vec<Arc<EditorBlock>> = blocks
        .iter()
        .map(|block| {
            let converted = block_to_internal(block);
            match cache.editor.get(block.key()) {
                Some(previous) if **previous == converted => Arc::clone(previous),
                _ => Arc::new(converted),
            }
        })
        .collect();

    cache.editor = tree.iter().map(|b| (b.key().to_string(), Arc::clone(b))).collect();
    tree
}

/// Editor tree → document value
pub fn from_internal(
    tree: &[Arc<EditorBlock>],
    schema: &Schema,
    cache: &mut IdentityCache,
) -> Result<Vec<Arc<Block>>, ConvertError> {
    let mut children = HashMap::new();
    let document = tree
        .iter()
        .map(|node| {
            let mut converted = block_from_internal(node, schema)?;
            if let Block::Text(text) = &mut converted {
                for child in &mut text.children {
                    let id = (text.key.clone(), child.key().to_string());
                    match cache.children.get(&id) {
                        Some(previous) if **previous == **child => *child = Arc::clone(previous),
                        _ => {}
                    }
                    children.insert(id, Arc::clone(child));
                }
            }
            Ok(match cache.document.get(node.key()) {
                Some(previous) if **previous == converted => Arc::clone(previous),
                _ => Arc::new(converted),
            })
        })
        .collect::<Result<Vec<_>, ConvertError>>()?;

    cache.document = document.iter().map(|b| (b.key().to_string(), Arc::clone(b))).collect();
    cache.children = children;
    Ok(document)
}

/// JSON form of a single editor block
pub fn block_json(block: &EditorBlock, schema: &Schema) -> Result<Json, ConvertError> {
    block_from_internal(block, schema).map(|b| b.to_json())
}

/// JSON form of a single inline node
pub fn inline_json(inline: &Inline, block_key: &str, schema: &Schema) -> Result<Json, ConvertError> {
    inline_from_internal(inline, block_key, schema).map(|c| c.to_json())
}

/// JSON form of a whole tree, bypassing the identity cache
pub fn tree_json(tree: &[Arc<EditorBlock>], schema: &Schema) -> Result<Json, ConvertError> {
    tree.iter()
        .map(|b| block_json(b, schema))
        .collect::<Result<Vec<_>, _>>()
        .map(Json::Array)
}
