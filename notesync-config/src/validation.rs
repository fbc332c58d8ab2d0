use std::path::PathBuf;

use thiserror::Error;

/// Guard rails checked before a configuration is handed to the core.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("at least one note glob is required")]
    NoGlobs,

    #[error("invalid note glob `{glob}`: {reason}")]
    InvalidGlob { glob: String, reason: String },

    #[error("invalid note pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("watch.debounce_window_ms must be greater than zero")]
    ZeroDebounceWindow,

    #[error("notes root {0} is not a directory")]
    RootNotDirectory(PathBuf),
}
