//! # Document model
//!
//! The portable block/span tree. A document value is an ordered list of
//! blocks; blocks and their children are shared behind `Arc`s so that two
//! snapshots holding the same logical, unchanged node can be compared by
//! reference.
//!
//! Text blocks are recognised by their `_type` matching [`Schema::block_type`];
//! any other block is an opaque block object. Inside a text block, children
//! whose `_type` matches [`Schema::span_type`] are spans and everything else is
//! an inline object.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::sync::Arc;

/// Ordered list of blocks. Absence of a value is `Option<Document>::None`.
pub type Document = Vec<Arc<Block>>;

/// Type names the document model needs to tell blocks and spans apart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub block_type: String,
    pub span_type: String,
    pub default_style: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            block_type: "block".to_string(),
            span_type: "span".to_string(),
            default_style: "normal".to_string(),
        }
    }
}

/// Text run with a set of marks (decorators or mark definition keys)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_type")]
    pub span_type: String,
    pub text: String,
    #[serde(default)]
    pub marks: Vec<String>,
}

impl Span {
    pub fn new(key: impl Into<String>, text: impl Into<String>, marks: Vec<String>) -> Self {
        Self {
            key: key.into(),
            span_type: "span".to_string(),
            text: text.into(),
            marks,
        }
    }

    pub fn empty(key: impl Into<String>) -> Self {
        Self::new(key, "", Vec::new())
    }

    pub fn has_mark(&self, mark: &str) -> bool {
        self.marks.iter().any(|m| m == mark)
    }
}

/// Annotation definition scoped to the block declaring it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkDef {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_type")]
    pub def_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Json>,
}

/// Non-text child of a text block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineObject {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_type")]
    pub object_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Child {
    Span(Span),
    Object(InlineObject),
}

impl Child {
    pub fn key(&self) -> &str {
        match self {
            Child::Span(s) => &s.key,
            Child::Object(o) => &o.key,
        }
    }

    pub fn as_span(&self) -> Option<&Span> {
        match self {
            Child::Span(s) => Some(s),
            Child::Object(_) => None,
        }
    }

    /// Text length in chars; inline objects count as zero width
    pub fn text_len(&self) -> usize {
        match self {
            Child::Span(s) => s.text.chars().count(),
            Child::Object(_) => 0,
        }
    }

    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }

    pub fn from_json(json: Json, schema: &Schema, block_key: &str, index: usize) -> ModelResult<Self> {
        let child_type = json
            .get("_type")
            .and_then(Json::as_str)
            .ok_or_else(|| ModelError::invalid_child(block_key, index, "missing _type"))?;

        if child_type == schema.span_type {
            serde_json::from_value(json)
                .map(Child::Span)
                .map_err(|e| ModelError::invalid_child(block_key, index, e.to_string()))
        } else {
            serde_json::from_value(json)
                .map(Child::Object)
                .map_err(|e| ModelError::invalid_child(block_key, index, e.to_string()))
        }
    }
}

/// Block holding spans and inline objects
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub key: String,
    pub block_type: String,
    pub style: Option<String>,
    pub list_item: Option<String>,
    pub level: Option<u32>,
    pub mark_defs: Vec<MarkDef>,
    pub children: Vec<Arc<Child>>,
    /// Fields outside the core text block shape, carried through untouched
    pub fields: Map<String, Json>,
}

impl TextBlock {
    pub fn find_child(&self, key: &str) -> Option<(usize, &Child)> {
        self.children
            .iter()
            .enumerate()
            .find(|(_, c)| c.key() == key)
            .map(|(i, c)| (i, c.as_ref()))
    }

    pub fn find_mark_def(&self, key: &str) -> Option<&MarkDef> {
        self.mark_defs.iter().find(|d| d.key == key)
    }

    /// Concatenated span text
    pub fn plain_text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| c.as_span())
            .map(|s| s.text.as_str())
            .collect()
    }
}

/// Opaque block-level object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectBlock {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_type")]
    pub block_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text(TextBlock),
    Object(ObjectBlock),
}

const TEXT_BLOCK_FIELDS: [&str; 7] = ["_key", "_type", "style", "listItem", "level", "markDefs", "children"];

impl Block {
    pub fn key(&self) -> &str {
        match self {
            Block::Text(b) => &b.key,
            Block::Object(b) => &b.key,
        }
    }

    pub fn block_type(&self) -> &str {
        match self {
            Block::Text(b) => &b.block_type,
            Block::Object(b) => &b.block_type,
        }
    }

    pub fn as_text(&self) -> Option<&TextBlock> {
        match self {
            Block::Text(b) => Some(b),
            Block::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Block::Object(b) => serde_json::to_value(b).unwrap_or(Json::Null),
            Block::Text(b) => {
                let mut map = b.fields.clone();
                map.insert("_key".into(), Json::String(b.key.clone()));
                map.insert("_type".into(), Json::String(b.block_type.clone()));
                if let Some(style) = &b.style {
                    map.insert("style".into(), Json::String(style.clone()));
                }
                if let Some(list_item) = &b.list_item {
                    map.insert("listItem".into(), Json::String(list_item.clone()));
                }
                if let Some(level) = b.level {
                    map.insert("level".into(), Json::from(level));
                }
                map.insert(
                    "markDefs".into(),
                    serde_json::to_value(&b.mark_defs).unwrap_or(Json::Array(Vec::new())),
                );
                map.insert(
                    "children".into(),
                    Json::Array(b.children.iter().map(|c| c.to_json()).collect()),
                );
                Json::Object(map)
            }
        }
    }

    pub fn from_json(json: Json, schema: &Schema, index: usize) -> ModelResult<Self> {
        let Json::Object(mut map) = json else {
            return Err(ModelError::invalid_block(index, "not an object"));
        };

        let key = match map.get("_key") {
            Some(Json::String(k)) => k.clone(),
            _ => return Err(ModelError::invalid_block(index, "missing _key")),
        };
        let block_type = match map.get("_type") {
            Some(Json::String(t)) => t.clone(),
            _ => return Err(ModelError::invalid_block(index, "missing _type")),
        };

        if block_type != schema.block_type {
            return serde_json::from_value(Json::Object(map))
                .map(Block::Object)
                .map_err(|e| ModelError::invalid_block(index, e.to_string()));
        }

        let style = match map.get("style") {
            Some(Json::String(s)) => Some(s.clone()),
            _ => None,
        };
        let list_item = match map.get("listItem") {
            Some(Json::String(s)) => Some(s.clone()),
            _ => None,
        };
        let level = map.get("level").and_then(Json::as_u64).map(|l| l as u32);
        let mark_defs = match map.remove("markDefs") {
            Some(defs) => serde_json::from_value(defs)
                .map_err(|e| ModelError::invalid_block(index, format!("markDefs: {e}")))?,
            None => Vec::new(),
        };
        let children = match map.remove("children") {
            Some(Json::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, child)| Child::from_json(child, schema, &key, i).map(Arc::new))
                .collect::<ModelResult<Vec<_>>>()?,
            _ => return Err(ModelError::invalid_block(index, "text block without children")),
        };

        for field in TEXT_BLOCK_FIELDS {
            map.remove(field);
        }

        Ok(Block::Text(TextBlock {
            key,
            block_type,
            style,
            list_item,
            level,
            mark_defs,
            children,
            fields: map,
        }))
    }
}

/// Serialize a document value to its JSON form
pub fn document_to_json(document: &[Arc<Block>]) -> Json {
    Json::Array(document.iter().map(|b| b.to_json()).collect())
}

/// Read a JSON array into a typed document value
pub fn document_from_json(json: Json, schema: &Schema) -> ModelResult<Document> {
    match json {
        Json::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Block::from_json(item, schema, i).map(Arc::new))
            .collect(),
        other => Err(ModelError::NotAnArray(json_kind(&other).to_string())),
    }
}

/// Find a block by key
pub fn find_block<'a>(document: &'a [Arc<Block>], key: &str) -> Option<(usize, &'a Arc<Block>)> {
    document.iter().enumerate().find(|(_, b)| b.key() == key)
}

pub(crate) fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Json {
        json!([
            {
                "_key": "a",
                "_type": "block",
                "style": "normal",
                "markDefs": [{"_key": "m1", "_type": "link", "href": "https://example.com"}],
                "children": [
                    {"_key": "s1", "_type": "span", "text": "Hello ", "marks": []},
                    {"_key": "s2", "_type": "span", "text": "link", "marks": ["m1"]},
                    {"_key": "i1", "_type": "mention", "user": "ada"}
                ]
            },
            {"_key": "img", "_type": "image", "asset": {"_ref": "image-1"}}
        ])
    }

    #[test]
    fn test_parse_text_and_object_blocks() {
        let doc = document_from_json(sample(), &Schema::default()).unwrap();
        assert_eq!(doc.len(), 2);

        let text = doc[0].as_text().unwrap();
        assert_eq!(text.children.len(), 3);
        assert!(matches!(*text.children[2], Child::Object(_)));
        assert_eq!(text.find_mark_def("m1").unwrap().def_type, "link");
        assert_eq!(text.plain_text(), "Hello link");

        assert!(matches!(doc[1].as_ref(), Block::Object(_)));
    }

    #[test]
    fn test_json_round_trip() {
        let schema = Schema::default();
        let doc = document_from_json(sample(), &schema).unwrap();
        assert_eq!(document_to_json(&doc), sample());
    }

    #[test]
    fn test_missing_children_is_invalid() {
        let err = document_from_json(json!([{"_key": "a", "_type": "block"}]), &Schema::default()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidBlock { index: 0, .. }));
    }

    #[test]
    fn test_non_array_value() {
        let err = document_from_json(json!({"_key": "a"}), &Schema::default()).unwrap_err();
        assert_eq!(err, ModelError::NotAnArray("object".to_string()));
    }
}
