//! # Value validation
//!
//! Structural checks on a document value supplied from outside the session.
//! Every problem found comes with the patches that repair it, so the session
//! can heal the value and report the repair to consumers.
//!
//! Paths are index based. Resolutions are ordered so that applying them one
//! after another stays valid: in-place fixes first, then child removals and
//! finally block removals, each from the highest index down.

use folio_model::{patch, KeyGenerator, Patch, Path, PathSegment, Schema};
use serde::Serialize;
use serde_json::{json, Map, Value as Json};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub patches: Vec<Patch>,
    pub description: String,
    pub action: String,
    pub item: Json,
}

impl Resolution {
    fn new(patches: Vec<Patch>, description: impl Into<String>, action: impl Into<String>, item: &Json) -> Self {
        Self {
            patches,
            description: description.into(),
            action: action.into(),
            item: item.clone(),
        }
    }
}

fn block_path(index: usize) -> Path {
    Path(vec![PathSegment::index(index)])
}

fn child_path(block: usize, child: usize) -> Path {
    block_path(block).with("children").with(child)
}

fn non_empty_str<'a>(object: &'a Map<String, Json>, field: &str) -> Option<&'a str> {
    object.get(field).and_then(Json::as_str).filter(|s| !s.is_empty())
}

fn empty_span(schema: &Schema, keys: &mut KeyGenerator) -> Json {
    json!({"_key": keys.new_key(), "_type": schema.span_type, "text": "", "marks": []})
}

#[derive(Default)]
struct Plan {
    fixes: Vec<Resolution>,
    child_removals: Vec<Resolution>,
    block_removals: Vec<Resolution>,
}

/// Check a value and describe how to repair it; empty when the value is valid
pub fn validate_value(value: &Json, schema: &Schema, keys: &mut KeyGenerator) -> Vec<Resolution> {
    let blocks = match value {
        Json::Null => return Vec::new(),
        Json::Array(blocks) => blocks,
        other => {
            return vec![Resolution::new(
                vec![patch::unset(Path::root())],
                "Value is not an array of blocks",
                "Unset the value",
                other,
            )]
        }
    };

    let mut plan = Plan::default();
    let mut seen_keys = HashSet::new();
    for (index, block) in blocks.iter().enumerate() {
        validate_block(index, block, schema, keys, &mut seen_keys, &mut plan);
    }

    plan.block_removals.reverse();
    let mut resolutions = plan.fixes;
    resolutions.extend(plan.child_removals);
    resolutions.extend(plan.block_removals);
    resolutions
}

fn validate_block(
    index: usize,
    block: &Json,
    schema: &Schema,
    keys: &mut KeyGenerator,
    seen_keys: &mut HashSet<String>,
    plan: &mut Plan,
) {
    let path = block_path(index);
    let Some(object) = block.as_object() else {
        plan.block_removals.push(Resolution::new(
            vec![patch::unset(path)],
            format!("Block at index {index} is not an object"),
            "Remove the block",
            block,
        ));
        return;
    };

    if non_empty_str(object, "_type").is_none() {
        plan.block_removals.push(Resolution::new(
            vec![patch::unset(path)],
            format!("Block at index {index} has no _type"),
            "Remove the block",
            block,
        ));
        return;
    }

    match non_empty_str(object, "_key") {
        Some(key) if seen_keys.insert(key.to_string()) => {}
        existing => {
            let description = match existing {
                Some(key) => format!("Block at index {index} repeats the key {key}"),
                None => format!("Block at index {index} has no _key"),
            };
            let key = keys.new_key();
            seen_keys.insert(key.clone());
            plan.fixes.push(Resolution::new(
                vec![patch::set(key, path.clone().with("_key"))],
                description,
                "Assign a new key",
                block,
            ));
        }
    }

    if object.get("_type").and_then(Json::as_str) != Some(schema.block_type.as_str()) {
        return;
    }

    if object.get("markDefs").map_or(true, |m| !m.is_array()) {
        plan.fixes.push(Resolution::new(
            vec![patch::set(json!([]), path.clone().with("markDefs"))],
            format!("Block at index {index} has no markDefs"),
            "Add empty markDefs",
            block,
        ));
    }

    if !object.contains_key("style") {
        plan.fixes.push(Resolution::new(
            vec![patch::set(schema.default_style.clone(), path.clone().with("style"))],
            format!("Block at index {index} has no style"),
            "Set the default style",
            block,
        ));
    }

    let children = match object.get("children").and_then(Json::as_array) {
        Some(children) if !children.is_empty() => children,
        _ => {
            plan.fixes.push(Resolution::new(
                vec![patch::set(json!([empty_span(schema, keys)]), path.with("children"))],
                format!("Block at index {index} has no children"),
                "Insert an empty span",
                block,
            ));
            return;
        }
    };

    let mut removals = Vec::new();
    let mut child_keys = HashSet::new();
    let mut referenced = HashSet::new();
    for (child_index, child) in children.iter().enumerate() {
        let child_path = child_path(index, child_index);
        let Some(child_object) = child.as_object().filter(|c| non_empty_str(c, "_type").is_some()) else {
            removals.push(Resolution::new(
                vec![patch::unset(child_path)],
                format!("Child {child_index} of block {index} has no _type"),
                "Remove the child",
                child,
            ));
            continue;
        };

        if !non_empty_str(child_object, "_key").is_some_and(|key| child_keys.insert(key.to_string())) {
            let key = keys.new_key();
            child_keys.insert(key.clone());
            plan.fixes.push(Resolution::new(
                vec![patch::set(key, child_path.clone().with("_key"))],
                format!("Child {child_index} of block {index} has a missing or repeated _key"),
                "Assign a new key",
                child,
            ));
        }

        if child_object.get("_type").and_then(Json::as_str) != Some(schema.span_type.as_str()) {
            continue;
        }
        match child_object.get("marks").and_then(Json::as_array) {
            Some(marks) => referenced.extend(marks.iter().filter_map(Json::as_str).map(str::to_string)),
            None => plan.fixes.push(Resolution::new(
                vec![patch::set(json!([]), child_path.clone().with("marks"))],
                format!("Span {child_index} of block {index} has no marks"),
                "Add empty marks",
                child,
            )),
        }
        if !child_object.get("text").is_some_and(Json::is_string) {
            plan.fixes.push(Resolution::new(
                vec![patch::set("", child_path.with("text"))],
                format!("Span {child_index} of block {index} has no text"),
                "Set empty text",
                child,
            ));
        }
    }

    if removals.len() == children.len() {
        plan.fixes.push(Resolution::new(
            vec![patch::set(json!([empty_span(schema, keys)]), path.with("children"))],
            format!("Block at index {index} has no valid children"),
            "Replace children with an empty span",
            block,
        ));
        return;
    }
    removals.reverse();
    plan.child_removals.extend(removals);

    if let Some(defs) = object.get("markDefs").and_then(Json::as_array) {
        for (def_index, def) in defs.iter().enumerate().rev() {
            let used = def
                .get("_key")
                .and_then(Json::as_str)
                .is_some_and(|key| referenced.contains(key));
            if !used {
                plan.fixes.push(Resolution::new(
                    vec![patch::unset(path.clone().with("markDefs").with(def_index))],
                    format!("Mark definition {def_index} of block {index} is not used"),
                    "Remove the mark definition",
                    def,
                ));
            }
        }
    }
}
