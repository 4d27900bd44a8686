//! # Folio Editor
//!
//! Editing session that keeps an internal editor tree and a portable
//! document value in sync through patches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ commands: editor API (marks, breaks, ...)   │
//! └─────────────────────────────────────────────┘
//!                     ↓ operations
//! ┌─────────────────────────────────────────────┐
//! │ session: local edits + remote patches       │
//! │  - normalize dirty blocks                   │
//! │  - translate operations → patches           │
//! │  - throttle remote patches while typing     │
//! │  - undo/redo transformed over remote work   │
//! └─────────────────────────────────────────────┘
//!          ↓ patches            ↑ patches
//! ┌─────────────────────────────────────────────┐
//! │ model: portable value + patch application   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **The portable value is the contract**: the tree is a derived view
//! 2. **One operation, one or more patches**: every local change is emitted
//! 3. **Remote patches are adapted**, never replayed as local edits
//! 4. **History never applies half a step**: undo and redo are atomic
//!
//! ## Usage
//!
//! ```rust,ignore
//! use folio_editor::{EditorConfig, EditorSession, Point, Range};
//!
//! let mut session = EditorSession::new(EditorConfig::default(), "client-1");
//! session.subscribe(|change| println!("{}", change.name()));
//! session.set_value(Some(value))?;
//!
//! session.select(Some(Range::collapsed(Point::new(0, 0, 5))))?;
//! session.insert_text(", world")?;
//! session.undo()?;
//! ```

mod adapter;
mod change;
mod clock;
mod commands;
mod config;
mod convert;
mod errors;
mod node;
mod normalize;
mod operations;
mod selection;
mod session;
mod translate;
mod undo_stack;
mod validate;

pub use adapter::{adapt, adjust_selection, Adapted, RemoteEffect};
pub use change::{ChangeBus, EditorChange, SubscriptionId};
pub use clock::{Clock, ManualClock, SystemClock, Throttle};
pub use commands::{AnnotationPaths, Entity};
pub use config::EditorConfig;
pub use convert::{block_from_internal, block_to_internal, from_internal, to_internal, IdentityCache};
pub use errors::{ConvertError, EditorError, EditorResult, OperationError, OperationResult};
pub use node::{EditorBlock, EditorTree, Inline, Node, Point, Range, Selection, TextElement, TextLeaf, VoidNode};
pub use operations::{Operation, Properties};
pub use selection::{to_index_range, to_stable_range, KeyedPoint, KeyedRange};
pub use session::{EditMode, EditorSession};
pub use translate::{document_json, translate};
pub use undo_stack::{AppliedOperation, UndoStack};
pub use validate::{validate_value, Resolution};

// Re-export the model so embedders need a single dependency
pub use folio_model as model;
