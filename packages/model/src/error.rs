use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while reading a JSON value into the typed document model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Document value must be an array, found {0}")]
    NotAnArray(String),

    #[error("Block at index {index} is invalid: {message}")]
    InvalidBlock { index: usize, message: String },

    #[error("Child at index {index} of block {block_key} is invalid: {message}")]
    InvalidChild {
        block_key: String,
        index: usize,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serde(String),
}

impl ModelError {
    pub fn invalid_block(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidBlock {
            index,
            message: message.into(),
        }
    }

    pub fn invalid_child(block_key: impl Into<String>, index: usize, message: impl Into<String>) -> Self {
        Self::InvalidChild {
            block_key: block_key.into(),
            index,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Serde(e.to_string())
    }
}

/// Why a single patch could not be applied
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApplyError {
    #[error("Path {0} does not resolve")]
    PathNotFound(String),

    #[error("Path {0} does not point into an array")]
    NotAnArray(String),

    #[error("Value at {0} is not a number")]
    NotANumber(String),

    #[error("Value at {0} is not a string")]
    NotAString(String),

    #[error("Text at {path} diverged from the diff base: {source}")]
    TextMismatch { path: String, source: DmpError },

    #[error("Patch {0} needs an existing document")]
    InvalidRoot(String),
}

/// Diff-match-patch decoding and application failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DmpError {
    #[error("Invalid patch header: {0}")]
    InvalidHeader(String),

    #[error("Invalid patch line: {0}")]
    InvalidLine(String),

    #[error("Invalid percent encoding: {0}")]
    InvalidEncoding(String),

    #[error("Hunk {hunk} base text not found")]
    BaseMismatch { hunk: usize },
}
