//! Error types for the editor

use folio_model::{ApplyError, ModelError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("No node at path {0:?}")]
    NodeNotFound(Vec<usize>),

    #[error("Node at {0:?} is not a text leaf")]
    NotText(Vec<usize>),

    #[error("Node at {0:?} is not a text block")]
    NotTextBlock(Vec<usize>),

    #[error("Offset {offset} is out of range for text of length {len}")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("Text at {path:?} offset {offset} does not match the removed text")]
    TextMismatch { path: Vec<usize>, offset: usize },

    #[error("Invalid path {0:?}")]
    InvalidPath(Vec<usize>),

    #[error("Cannot merge {0:?} into its previous sibling")]
    CannotMerge(Vec<usize>),

    #[error("Invalid property {name}: {message}")]
    InvalidProperty { name: String, message: String },

    #[error("Remote patch does not resolve: {0}")]
    Unresolved(#[from] ApplyError),

    #[error("Remote patch carries an invalid value: {0}")]
    InvalidValue(#[from] ModelError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),
}

pub type OperationResult<T> = Result<T, OperationError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("Node {key} is not a valid block")]
    NotAValidBlock { key: String },

    #[error("Child {key} of block {block_key} is not a valid inline node")]
    NotAValidChild { block_key: String, key: String },
}

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Invalid document value: {0}")]
    Model(#[from] ModelError),

    #[error("No selection")]
    NoSelection,

    #[error("Selection is not inside a text block")]
    NotInTextBlock,
}

pub type EditorResult<T> = Result<T, EditorError>;
