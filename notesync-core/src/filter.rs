//! Note eligibility and path normalization.
//!
//! Every path that reaches the index goes through [`normalize_path`] first so
//! that the bulk loader and the watcher agree on keys. [`PathFilter`] decides
//! whether a normalized path belongs to the note set at all.

use std::env;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;

/// Default eligibility pattern: markdown files.
pub const DEFAULT_NOTE_PATTERN: &str = r"\.(?:md|markdown)$";

static DEFAULT_NOTE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(DEFAULT_NOTE_PATTERN).expect("default note pattern regex should compile")
});

/// Pure predicate over paths, backed by the configured eligibility regex.
#[derive(Debug, Clone)]
pub struct PathFilter {
    re: Regex,
}

impl PathFilter {
    /// Compiles `pattern`. A malformed pattern is a startup error.
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            re: Regex::new(pattern)?,
        })
    }

    pub fn from_regex(re: Regex) -> Self {
        Self { re }
    }

    /// Whether `path` belongs to the note set.
    pub fn is_supported(&self, path: &Path) -> bool {
        self.re.is_match(&path.to_string_lossy())
    }

    pub fn pattern(&self) -> &str {
        self.re.as_str()
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::from_regex(DEFAULT_NOTE_REGEX.clone())
    }
}

/// Produces the absolute, lexically cleaned form of `path`.
///
/// Relative paths are resolved against the current working directory. `.` is
/// dropped and `..` pops a component; nothing touches the filesystem, so paths
/// of files that no longer exist normalize the same way they did while they
/// existed.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        cwd.join(path)
    };

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(prefix) => clean.push(prefix.as_os_str()),
            Component::RootDir => clean.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            Component::Normal(seg) => clean.push(seg),
        }
    }
    clean
}

/// Checks whether `path` lives under `root`.
pub fn path_within_root(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}
