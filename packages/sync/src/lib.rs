//! # Folio Sync
//!
//! Runs an editing session on a single tokio task. Remote patch batches and
//! local commands arrive over `mpsc` channels; every change the session
//! emits is fanned out on a `broadcast` channel.
//!
//! ```rust,ignore
//! let session = EditorSession::with_clock(config, "client-1", Arc::new(TokioClock::new()));
//! let handle = SyncDriver::spawn(session, SyncConfig::default());
//! let mut events = handle.events();
//!
//! handle.command(Command::InsertText("hi".into())).await?;
//! handle.send_remote(patches).await?;
//! let session = handle.shutdown().await?;
//! ```

mod clock;
mod driver;
mod error;

pub use clock::TokioClock;
pub use driver::{Command, SyncConfig, SyncDriver, SyncHandle};
pub use error::{SyncError, SyncResult};
