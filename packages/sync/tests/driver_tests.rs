//! Session task behavior under paused tokio time

use folio_editor::model::patch::insert;
use folio_editor::model::{InsertPosition, Path};
use folio_editor::{EditorChange, EditorConfig, EditorError, EditorSession, Point, Range};
use folio_sync::{Command, SyncConfig, SyncDriver, SyncError, TokioClock};
use serde_json::{json, Value as Json};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

fn hello() -> Json {
    json!([{
        "_key": "a", "_type": "block", "style": "normal", "markDefs": [],
        "children": [{"_key": "s1", "_type": "span", "text": "Hello", "marks": []}]
    }])
}

fn session() -> EditorSession {
    let mut session = EditorSession::with_clock(EditorConfig::default(), "sync", Arc::new(TokioClock::new()));
    session.set_value(Some(hello())).unwrap();
    session
}

fn caret(o: usize) -> Option<Range> {
    Some(Range::collapsed(Point::new(0, 0, o)))
}

#[tokio::test(start_paused = true)]
async fn test_commands_stream_changes() {
    let handle = SyncDriver::spawn(session(), SyncConfig::default());
    let mut events = handle.events();

    handle.command(Command::Select(caret(5))).await.unwrap();
    handle.command(Command::InsertText("!".into())).await.unwrap();

    let mut names = Vec::new();
    while let Some(change) = events.next().await {
        names.push(change.name());
        if matches!(change, EditorChange::Mutation { .. }) {
            break;
        }
    }
    assert_eq!(names, vec!["selection", "patch", "mutation"]);

    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.tree()[0].as_text().unwrap().text(), "Hello!");
}

#[tokio::test(start_paused = true)]
async fn test_interval_ends_the_throttle_and_flushes() {
    let handle = SyncDriver::spawn(session(), SyncConfig::default());
    let mut events = handle.events();

    handle.command(Command::Select(caret(5))).await.unwrap();
    handle.command(Command::InsertText("!".into())).await.unwrap();

    let block = json!({"_key": "r", "_type": "block", "style": "normal", "markDefs": [],
                       "children": [{"_key": "r1", "_type": "span", "text": "Remote", "marks": []}]});
    handle
        .send_remote(vec![insert(vec![block], InsertPosition::Before, Path::block("a"))])
        .await
        .unwrap();

    // Throttle on, then off once the window has passed
    let mut throttles = Vec::new();
    while throttles.len() < 2 {
        if let Some(EditorChange::Throttle { throttle }) = events.next().await {
            throttles.push(throttle);
        }
    }
    assert_eq!(throttles, vec![true, false]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.queued_patches(), 0);
    assert_eq!(session.tree().len(), 2);
    assert_eq!(session.selection(), Some(&Range::collapsed(Point::new(1, 0, 6))));
}

#[tokio::test(start_paused = true)]
async fn test_command_errors_are_returned() {
    let handle = SyncDriver::spawn(session(), SyncConfig::default());
    let result = handle.command(Command::InsertText("x".into())).await;
    assert!(matches!(result, Err(SyncError::Editor(EditorError::NoSelection))));

    // The task keeps serving after a failed command
    handle.command(Command::Select(caret(0))).await.unwrap();
    handle
        .command(Command::Edit(Box::new(|s| s.toggle_block_style("h1"))))
        .await
        .unwrap();
    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.tree()[0].as_text().unwrap().style.as_deref(), Some("h1"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_extra_producers() {
    let handle = SyncDriver::spawn(session(), SyncConfig::default());
    let producer = handle.remote_sender();

    let block = json!({"_key": "late", "_type": "block", "style": "normal", "markDefs": [],
                       "children": [{"_key": "late1", "_type": "span", "text": "", "marks": []}]});
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        producer
            .send(vec![insert(vec![block], InsertPosition::After, Path::block("a"))])
            .await
            .unwrap();
    });

    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.tree().len(), 2);
}
