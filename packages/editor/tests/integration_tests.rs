//! End-to-end editing scenarios through the public session API

use folio_editor::model::patch::{diff_match_patch, insert, set, set_if_missing, unset};
use folio_editor::model::{apply_all_json, dmp, InsertPosition, Patch, Path};
use folio_editor::{EditorChange, EditorConfig, EditorSession, ManualClock, Operation, Point, Range};
use serde_json::{json, Value as Json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

fn session_with(value: Option<Json>) -> (EditorSession, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let mut session = EditorSession::with_clock(EditorConfig::default(), "it", clock.clone());
    session.set_value(value).unwrap();
    (session, clock)
}

fn record(session: &mut EditorSession) -> Arc<Mutex<Vec<EditorChange>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    session.subscribe(move |change| sink.lock().unwrap().push(change.clone()));
    events
}

fn mutation_patches(events: &Mutex<Vec<EditorChange>>) -> Vec<Patch> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            EditorChange::Mutation { patches } => Some(patches.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn hello() -> Json {
    json!([{
        "_key": "a", "_type": "block", "style": "normal", "markDefs": [],
        "children": [{"_key": "s1", "_type": "span", "text": "Hello", "marks": []}]
    }])
}

fn caret(b: usize, c: usize, o: usize) -> Option<Range> {
    Some(Range::collapsed(Point::new(b, c, o)))
}

fn remote_block(key: &str, text: &str) -> Json {
    json!({"_key": key, "_type": "block", "style": "normal", "markDefs": [],
           "children": [{"_key": format!("{key}1"), "_type": "span", "text": text, "marks": []}]})
}

fn texts(session: &EditorSession) -> Vec<String> {
    session.tree().iter().filter_map(|b| b.as_text()).map(|t| t.text()).collect()
}

fn settle(session: &mut EditorSession, clock: &ManualClock) {
    clock.advance(EditorConfig::default().throttle_ms + 1);
    session.tick();
}

#[test]
fn test_typing_emits_a_single_text_patch() {
    let (mut session, _) = session_with(Some(hello()));
    session.select(caret(0, 0, 5)).unwrap();
    let events = record(&mut session);

    session.insert_text(" world").unwrap();

    let patches = mutation_patches(&events);
    assert_eq!(patches, vec![set("Hello world", Path::child("a", "s1").with("text"))]);

    let outcome = apply_all_json(Some(hello()), &patches);
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.value, session.value_json());
    assert_eq!(outcome.value.unwrap()[0]["children"][0]["text"], json!("Hello world"));
}

#[test]
fn test_removing_the_only_span_leaves_an_empty_one() {
    let value = json!([
        {"_key": "a", "_type": "block", "style": "normal", "markDefs": [],
         "children": [{"_key": "s1", "_type": "span", "text": "Hello", "marks": []}]},
        {"_key": "b", "_type": "block", "style": "normal", "markDefs": [],
         "children": [{"_key": "s2", "_type": "span", "text": "Bye", "marks": []}]}
    ]);
    let (mut session, _) = session_with(Some(value.clone()));
    let events = record(&mut session);

    let span = session.tree()[1].as_text().unwrap().children[0].clone();
    session
        .apply(Operation::RemoveNode {
            path: vec![1, 0],
            node: folio_editor::Node::Inline(span),
        })
        .unwrap();

    let block = session.tree()[1].as_text().unwrap();
    assert_eq!(block.children.len(), 1);
    assert_eq!(block.children[0].as_text().unwrap().text, "");

    let outcome = apply_all_json(Some(value), &mutation_patches(&events));
    assert_eq!(outcome.value, session.value_json());
    assert_eq!(outcome.value.unwrap()[1]["children"].as_array().unwrap().len(), 1);
}

#[test]
fn test_typing_into_the_placeholder_prefixes_set_if_missing() {
    let (mut session, _) = session_with(None);
    assert!(session.value().is_none());
    session.select(caret(0, 0, 0)).unwrap();
    let events = record(&mut session);

    session.insert_text("a").unwrap();

    let patches = mutation_patches(&events);
    assert_eq!(patches.len(), 2);
    let Patch::SetIfMissing { path, value } = &patches[0] else {
        panic!("expected setIfMissing first, got {:?}", patches[0]);
    };
    assert!(path.is_root());
    assert_eq!(value[0]["children"][0]["text"], json!(""));
    assert_eq!(patches[0], set_if_missing(value.clone(), Path::root()));

    let outcome = apply_all_json(None, &patches);
    assert_eq!(outcome.value, session.value_json());
    assert!(session.value().is_some());
}

#[test]
fn test_clearing_everything_unsets_the_value() {
    let (mut session, _) = session_with(Some(hello()));
    session.select(Some(Range::new(Point::new(0, 0, 0), Point::new(0, 0, 5)))).unwrap();
    let events = record(&mut session);

    session.delete_backward().unwrap();

    assert!(session.value().is_none());
    let names: Vec<&str> = events.lock().unwrap().iter().map(EditorChange::name).collect();
    assert!(names.contains(&"unset"));
    let outcome = apply_all_json(Some(hello()), &mutation_patches(&events));
    assert_eq!(outcome.value, None);
}

#[test]
fn test_event_order_for_a_local_edit() {
    let (mut session, _) = session_with(Some(hello()));
    session.select(caret(0, 0, 5)).unwrap();
    let events = record(&mut session);

    session.insert_text("!").unwrap();

    let names: Vec<&str> = events.lock().unwrap().iter().map(EditorChange::name).collect();
    assert_eq!(names, vec!["patch", "mutation", "throttle", "selection"]);
}

#[test]
fn test_remote_patches_wait_for_the_throttle_window() {
    let (mut session, clock) = session_with(Some(hello()));
    session.select(caret(0, 0, 5)).unwrap();
    session.insert_text("!").unwrap();
    assert!(session.is_throttling());

    let remote = folio_editor::model::patch::insert(
        vec![json!({"_key": "r", "_type": "block", "style": "normal", "markDefs": [],
                    "children": [{"_key": "r1", "_type": "span", "text": "Remote", "marks": []}]})],
        folio_editor::model::InsertPosition::Before,
        Path::block("a"),
    );
    session.receive_remote(vec![remote]);
    assert_eq!(session.queued_patches(), 1);
    assert_eq!(session.tree().len(), 1);

    clock.advance(EditorConfig::default().throttle_ms + 1);
    session.tick();

    assert!(!session.is_throttling());
    assert_eq!(session.queued_patches(), 0);
    assert_eq!(session.tree().len(), 2);
    assert_eq!(session.selection(), caret(1, 0, 6).as_ref());
}

#[test]
fn test_keyed_selection_survives_remote_reordering() {
    let (mut session, _) = session_with(Some(hello()));
    session.select(caret(0, 0, 2)).unwrap();
    let keyed = session.keyed_selection().unwrap();

    let remote = folio_editor::model::patch::insert(
        vec![json!({"_key": "r", "_type": "block", "style": "normal", "markDefs": [],
                    "children": [{"_key": "r1", "_type": "span", "text": "", "marks": []}]})],
        folio_editor::model::InsertPosition::Before,
        Path::block("a"),
    );
    session.receive_remote(vec![remote]);

    assert_eq!(session.keyed_selection(), Some(keyed));
    assert_eq!(session.selection(), caret(1, 0, 2).as_ref());
}

#[test]
fn test_typing_inside_the_window_keeps_remote_patches_queued() {
    let (mut session, clock) = session_with(Some(hello()));
    session.select(caret(0, 0, 5)).unwrap();
    session.insert_text("!").unwrap();
    session.receive_remote(vec![insert(vec![remote_block("r", "Remote")], InsertPosition::Before, Path::block("a"))]);

    clock.advance(100);
    session.insert_text("?").unwrap();
    assert!(session.is_throttling());
    assert_eq!(session.tree().len(), 1);
    assert_eq!(session.queued_patches(), 1);
    assert_eq!(session.tree_selection(), caret(0, 0, 7).as_ref());
    assert_eq!(session.selection(), caret(1, 0, 7).as_ref());

    settle(&mut session, &clock);
    assert_eq!(texts(&session), vec!["Remote", "Hello!?"]);
    assert_eq!(session.selection(), caret(1, 0, 7).as_ref());
}

#[test]
fn test_block_style_targets_the_selected_block_while_patches_are_queued() {
    let (mut session, clock) = session_with(Some(hello()));
    session.select(caret(0, 0, 5)).unwrap();
    session.insert_text("!").unwrap();
    session.receive_remote(vec![insert(vec![remote_block("r", "Remote")], InsertPosition::Before, Path::block("a"))]);

    session.toggle_block_style("h1").unwrap();
    settle(&mut session, &clock);

    let styles: Vec<(String, Option<String>)> = session
        .tree()
        .iter()
        .map(|b| (b.key().to_string(), b.as_text().and_then(|t| t.style.clone())))
        .collect();
    assert_eq!(
        styles,
        vec![
            ("r".to_string(), Some("normal".to_string())),
            ("a".to_string(), Some("h1".to_string()))
        ]
    );
}

#[test]
fn test_queued_text_diff_resolves_after_an_earlier_queued_insert() {
    let (mut session, clock) = session_with(Some(hello()));
    session.select(caret(0, 0, 5)).unwrap();
    session.insert_text("!").unwrap();

    session.receive_remote(vec![
        insert(vec![remote_block("r", "Remote")], InsertPosition::Before, Path::block("a")),
        diff_match_patch(
            dmp::make_patch_text("Hello!", ">> Hello!"),
            Path::child("a", "s1").with("text"),
        ),
    ]);
    assert_eq!(session.tree().len(), 1);
    assert_eq!(session.selection(), caret(1, 0, 9).as_ref());

    settle(&mut session, &clock);
    assert_eq!(texts(&session), vec!["Remote", ">> Hello!"]);
    assert_eq!(session.selection(), caret(1, 0, 9).as_ref());
}

#[test]
fn test_queued_span_removal_moves_the_caret_to_the_previous_sibling() {
    let (mut session, clock) = session_with(Some(json!([{
        "_key": "a", "_type": "block", "style": "normal", "markDefs": [],
        "children": [
            {"_key": "s1", "_type": "span", "text": "Hello ", "marks": []},
            {"_key": "s2", "_type": "span", "text": "world", "marks": ["strong"]}
        ]
    }])));
    session.select(caret(0, 1, 5)).unwrap();
    session.insert_text("!").unwrap();

    session.receive_remote(vec![
        insert(vec![remote_block("r", "Remote")], InsertPosition::Before, Path::block("a")),
        unset(Path::child("a", "s2")),
    ]);
    assert_eq!(session.selection(), caret(1, 0, 6).as_ref());

    settle(&mut session, &clock);
    assert_eq!(texts(&session), vec!["Remote", "Hello "]);
    assert_eq!(session.selection(), caret(1, 0, 6).as_ref());
}

#[test]
fn test_reopened_document_never_reuses_keys() {
    let (mut first, _) = session_with(Some(hello()));
    first.select(caret(0, 0, 5)).unwrap();
    first.insert_break().unwrap();
    first.insert_break().unwrap();

    let (mut second, _) = session_with(first.value_json());
    second.select(caret(2, 0, 0)).unwrap();
    second.insert_break().unwrap();
    second.insert_break().unwrap();

    let keys: Vec<String> = second
        .tree()
        .iter()
        .flat_map(|b| {
            let children: Vec<String> = b
                .as_text()
                .map(|t| t.children.iter().map(|c| c.key().to_string()).collect())
                .unwrap_or_default();
            std::iter::once(b.key().to_string()).chain(children)
        })
        .collect();
    assert_eq!(second.tree().len(), 5);
    let unique: HashSet<&String> = keys.iter().collect();
    assert_eq!(unique.len(), keys.len(), "duplicate keys in {keys:?}");
}
