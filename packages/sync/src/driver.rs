use crate::error::{SyncError, SyncResult};
use folio_editor::model::Patch;
use folio_editor::{EditorChange, EditorResult, EditorSession, Operation, Range};
use serde_json::Value as Json;
use std::fmt;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

/// Local work for the session task
pub enum Command {
    Apply(Operation),
    Select(Option<Range>),
    InsertText(String),
    DeleteBackward,
    InsertBreak,
    ToggleMark(String),
    Undo,
    Redo,
    SetValue(Option<Json>),
    /// Any other editor API call
    Edit(Box<dyn FnOnce(&mut EditorSession) -> EditorResult<()> + Send>),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Apply(_) => "apply",
            Command::Select(_) => "select",
            Command::InsertText(_) => "insertText",
            Command::DeleteBackward => "deleteBackward",
            Command::InsertBreak => "insertBreak",
            Command::ToggleMark(_) => "toggleMark",
            Command::Undo => "undo",
            Command::Redo => "redo",
            Command::SetValue(_) => "setValue",
            Command::Edit(_) => "edit",
        }
    }

    fn execute(self, session: &mut EditorSession) -> EditorResult<()> {
        match self {
            Command::Apply(op) => session.apply(op),
            Command::Select(range) => session.select(range),
            Command::InsertText(text) => session.insert_text(&text),
            Command::DeleteBackward => session.delete_backward(),
            Command::InsertBreak => session.insert_break(),
            Command::ToggleMark(mark) => session.toggle_mark(&mark),
            Command::Undo => session.undo().map(|_| ()),
            Command::Redo => session.redo().map(|_| ()),
            Command::SetValue(value) => session.set_value(value),
            Command::Edit(f) => f(session),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct Request {
    command: Command,
    reply: oneshot::Sender<EditorResult<()>>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub channel_capacity: usize,
    pub event_capacity: usize,
    /// How often `tick()` runs to end the throttle window
    pub tick: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            event_capacity: 256,
            tick: Duration::from_millis(50),
        }
    }
}

pub struct SyncDriver;

impl SyncDriver {
    /// Move `session` onto its own task
    pub fn spawn(mut session: EditorSession, config: SyncConfig) -> SyncHandle {
        let (remote_tx, remote_rx) = mpsc::channel(config.channel_capacity);
        let (command_tx, command_rx) = mpsc::channel(config.channel_capacity);
        let (events, _) = broadcast::channel(config.event_capacity);

        let sink = events.clone();
        session.subscribe(move |change| {
            // No receivers is fine
            let _ = sink.send(change.clone());
        });

        let task = tokio::spawn(run(session, remote_rx, command_rx, config.tick));
        SyncHandle {
            remote: remote_tx,
            commands: command_tx,
            events,
            task,
        }
    }
}

async fn run(
    mut session: EditorSession,
    mut remote: mpsc::Receiver<Vec<Patch>>,
    mut commands: mpsc::Receiver<Request>,
    tick: Duration,
) -> EditorSession {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let (mut remote_open, mut commands_open) = (true, true);
    info!("session task started");

    while remote_open || commands_open {
        tokio::select! {
            batch = remote.recv(), if remote_open => match batch {
                Some(patches) => {
                    debug!(patches = patches.len(), "remote batch");
                    session.receive_remote(patches);
                }
                None => remote_open = false,
            },
            request = commands.recv(), if commands_open => match request {
                Some(Request { command, reply }) => {
                    let name = command.name();
                    let result = command.execute(&mut session);
                    if let Err(err) = &result {
                        warn!(command = name, error = %err, "command failed");
                    }
                    let _ = reply.send(result);
                }
                None => commands_open = false,
            },
            _ = ticker.tick() => session.tick(),
        }
    }

    info!("session task stopped");
    session
}

/// Client side of a spawned session
pub struct SyncHandle {
    remote: mpsc::Sender<Vec<Patch>>,
    commands: mpsc::Sender<Request>,
    events: broadcast::Sender<EditorChange>,
    task: JoinHandle<EditorSession>,
}

impl SyncHandle {
    /// Run a command and wait for its result
    pub async fn command(&self, command: Command) -> SyncResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Request { command, reply })
            .await
            .map_err(|_| SyncError::Closed)?;
        response.await.map_err(|_| SyncError::Closed)??;
        Ok(())
    }

    pub async fn send_remote(&self, patches: Vec<Patch>) -> SyncResult<()> {
        self.remote.send(patches).await.map_err(|_| SyncError::Closed)
    }

    /// Extra producer for remote patches; the task keeps running while any is alive
    pub fn remote_sender(&self) -> mpsc::Sender<Vec<Patch>> {
        self.remote.clone()
    }

    /// Changes emitted from now on; lagging receivers skip what they missed
    pub fn events(&self) -> impl Stream<Item = EditorChange> + Unpin {
        BroadcastStream::new(self.events.subscribe()).filter_map(|item| match item {
            Ok(change) => Some(change),
            Err(err) => {
                warn!(error = %err, "change stream lagged");
                None
            }
        })
    }

    /// Close the channels and get the session back
    pub async fn shutdown(self) -> SyncResult<EditorSession> {
        let SyncHandle {
            remote,
            commands,
            task,
            ..
        } = self;
        drop(remote);
        drop(commands);
        Ok(task.await?)
    }
}

impl fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHandle")
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}
