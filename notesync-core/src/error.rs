use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or watching notes.
#[derive(Error, Debug)]
pub enum NoteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watch error for {root}: {message}")]
    Watch { root: PathBuf, message: String },

    #[error("Invalid note pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid glob: {0}")]
    InvalidGlob(#[from] globset::Error),

    #[error("Watch session closed: {0}")]
    Closed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NoteError {
    pub(crate) fn watch(root: &std::path::Path, message: impl ToString) -> Self {
        NoteError::Watch {
            root: root.to_path_buf(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NoteError>;
