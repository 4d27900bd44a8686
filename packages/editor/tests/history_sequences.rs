//! Undo/redo sequences, alone and interleaved with remote patches
//!
//! Covers:
//! - Undo then redo returning to the same values
//! - History steps transformed over remote inserts and removals, of blocks
//!   and of spans
//! - Steps whose target was removed remotely

use folio_editor::model::patch::{insert, set, unset};
use folio_editor::model::{InsertPosition, Path};
use folio_editor::{EditorChange, EditorConfig, EditorSession, ManualClock, Point, Range};
use serde_json::{json, Value as Json};
use std::sync::{Arc, Mutex};

fn two_blocks() -> Json {
    json!([
        {"_key": "a", "_type": "block", "style": "normal", "markDefs": [],
         "children": [{"_key": "a1", "_type": "span", "text": "Hello world", "marks": []}]},
        {"_key": "b", "_type": "block", "style": "normal", "markDefs": [],
         "children": [{"_key": "b1", "_type": "span", "text": "Second", "marks": []}]}
    ])
}

fn remote_block(key: &str, text: &str) -> Json {
    json!({"_key": key, "_type": "block", "style": "normal", "markDefs": [],
           "children": [{"_key": format!("{key}1"), "_type": "span", "text": text, "marks": []}]})
}

fn session() -> (EditorSession, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let mut session = EditorSession::with_clock(EditorConfig::default(), "history", clock.clone());
    session.set_value(Some(two_blocks())).unwrap();
    (session, clock)
}

fn settle(session: &mut EditorSession, clock: &ManualClock) {
    clock.advance(EditorConfig::default().throttle_ms + 1);
    session.tick();
}

fn texts(session: &EditorSession) -> Vec<String> {
    session.tree().iter().filter_map(|b| b.as_text()).map(|t| t.text()).collect()
}

fn spans(session: &EditorSession, block: usize) -> Vec<String> {
    session.tree()[block]
        .as_text()
        .map(|t| t.children.iter().filter_map(|c| c.as_text()).map(|l| l.text.clone()).collect())
        .unwrap_or_default()
}

fn caret(b: usize, c: usize, o: usize) -> Option<Range> {
    Some(Range::collapsed(Point::new(b, c, o)))
}

#[test]
fn test_undo_redo_returns_to_the_same_values() {
    let (mut s, _) = session();
    let original = s.value_json();

    s.select(caret(0, 0, 5)).unwrap();
    s.insert_text(",").unwrap();
    s.insert_break().unwrap();
    s.select(Some(Range::new(Point::new(1, 0, 1), Point::new(1, 0, 6)))).unwrap();
    s.toggle_mark("strong").unwrap();
    let edited = s.value_json();

    while s.undo().unwrap() {}
    assert_eq!(s.value_json(), original);

    while s.redo().unwrap() {}
    assert_eq!(s.value_json(), edited);
}

#[test]
fn test_undo_emits_the_patches_it_produced() {
    let (mut s, _) = session();
    s.select(caret(1, 0, 6)).unwrap();
    s.insert_text("!").unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    s.subscribe(move |change| sink.lock().unwrap().push(change.clone()));
    assert!(s.undo().unwrap());

    let events = events.lock().unwrap();
    let undo = events
        .iter()
        .find_map(|e| match e {
            EditorChange::Undo { patches } => Some(patches.clone()),
            _ => None,
        })
        .expect("undo event");
    assert_eq!(undo, vec![set("Second", Path::child("b", "b1").with("text"))]);
}

#[test]
fn test_undo_after_remote_insert_targets_the_moved_block() {
    let (mut s, clock) = session();
    s.select(caret(1, 0, 6)).unwrap();
    s.insert_text("!").unwrap();
    settle(&mut s, &clock);

    s.receive_remote(vec![insert(vec![remote_block("r", "Remote")], InsertPosition::Before, Path::block("a"))]);
    assert_eq!(texts(&s), vec!["Remote", "Hello world", "Second!"]);

    assert!(s.undo().unwrap());
    assert_eq!(texts(&s), vec!["Remote", "Hello world", "Second"]);

    assert!(s.redo().unwrap());
    assert_eq!(texts(&s), vec!["Remote", "Hello world", "Second!"]);
}

#[test]
fn test_undo_after_remote_text_edit_earlier_in_the_span() {
    let (mut s, clock) = session();
    s.select(caret(0, 0, 11)).unwrap();
    s.insert_text("!").unwrap();
    settle(&mut s, &clock);

    s.receive_remote(vec![set(">> Hello world!", Path::child("a", "a1").with("text"))]);
    assert!(s.undo().unwrap());
    assert_eq!(texts(&s)[0], ">> Hello world");
}

#[test]
fn test_steps_on_a_removed_block_are_dropped() {
    let (mut s, clock) = session();
    s.select(caret(1, 0, 6)).unwrap();
    s.insert_text("!").unwrap();
    settle(&mut s, &clock);

    s.receive_remote(vec![unset(Path::block("b"))]);
    assert_eq!(texts(&s), vec!["Hello world"]);

    // Nothing left to revert, but the step is consumed without touching the document
    let before = s.value_json();
    s.undo().unwrap();
    assert_eq!(s.value_json(), before);
}

#[test]
fn test_new_edit_clears_redo() {
    let (mut s, _) = session();
    s.select(caret(0, 0, 0)).unwrap();
    s.insert_text("x").unwrap();
    s.undo().unwrap();
    assert!(s.history().can_redo());

    s.insert_text("y").unwrap();
    assert!(!s.history().can_redo());
    assert!(!s.redo().unwrap());
}

#[test]
fn test_set_value_resets_history() {
    let (mut s, _) = session();
    s.select(caret(0, 0, 0)).unwrap();
    s.insert_text("x").unwrap();
    assert!(s.history().can_undo());

    s.set_value(Some(two_blocks())).unwrap();
    assert!(!s.history().can_undo());
}

#[test]
fn test_undo_after_remote_span_insert_targets_the_moved_span() {
    let (mut s, clock) = session();
    s.select(caret(0, 0, 11)).unwrap();
    s.insert_text("!").unwrap();
    settle(&mut s, &clock);

    let span = json!({"_key": "p", "_type": "span", "text": ">> ", "marks": ["em"]});
    s.receive_remote(vec![insert(vec![span], InsertPosition::Before, Path::child("a", "a1"))]);
    assert_eq!(spans(&s, 0), vec![">> ", "Hello world!"]);

    assert!(s.undo().unwrap());
    assert_eq!(spans(&s, 0), vec![">> ", "Hello world"]);

    assert!(s.redo().unwrap());
    assert_eq!(spans(&s, 0), vec![">> ", "Hello world!"]);
}

#[test]
fn test_steps_on_a_removed_span_are_dropped() {
    let (mut s, clock) = session();
    s.set_value(Some(json!([{
        "_key": "a", "_type": "block", "style": "normal", "markDefs": [],
        "children": [
            {"_key": "a1", "_type": "span", "text": "Hello ", "marks": []},
            {"_key": "a2", "_type": "span", "text": "world", "marks": ["strong"]}
        ]
    }])))
    .unwrap();
    s.select(caret(0, 1, 5)).unwrap();
    s.insert_text("!").unwrap();
    settle(&mut s, &clock);

    s.receive_remote(vec![unset(Path::child("a", "a2"))]);
    assert_eq!(spans(&s, 0), vec!["Hello "]);

    let before = s.value_json();
    s.undo().unwrap();
    assert_eq!(s.value_json(), before);
    assert_eq!(spans(&s, 0), vec!["Hello "]);
}
