use folio_editor::EditorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Session task is no longer running")]
    Closed,

    #[error("Session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Editor(#[from] EditorError),
}

pub type SyncResult<T> = Result<T, SyncError>;
