//! # Folio Model
//!
//! Portable document model and the patch format used to keep consumers of a
//! rich-text document in sync with an editing session.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ document: blocks, spans, mark definitions    │
//! ├──────────────────────────────────────────────┤
//! │ patch/path: wire format + constructors       │
//! ├──────────────────────────────────────────────┤
//! │ apply/compact: pure patch log processing     │
//! ├──────────────────────────────────────────────┤
//! │ dmp: diff-match-patch text hunks             │
//! └──────────────────────────────────────────────┘
//! ```

pub mod apply;
pub mod compact;
pub mod dmp;
pub mod document;
pub mod error;
pub mod keys;
pub mod patch;
pub mod path;

pub use apply::{apply_all, apply_all_json, apply_patch, resolve, ApplyOutcome, DocumentOutcome, PatchFailure};
pub use compact::compact;
pub use document::{
    document_from_json, document_to_json, find_block, Block, Child, Document, InlineObject, MarkDef, ObjectBlock,
    Schema, Span, TextBlock,
};
pub use error::{ApplyError, DmpError, ModelError, ModelResult};
pub use keys::KeyGenerator;
pub use patch::{InsertPosition, Patch};
pub use path::{KeyedSegment, Path, PathSegment};
