use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::task::spawn_blocking;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{NoteError, Result};

/// Lists candidate note files under a root.
#[async_trait]
pub trait NoteEnumerator: Send + Sync {
    /// Returns absolute paths under `root` matching any of `globs`.
    ///
    /// Globs are matched against the path relative to `root`.
    async fn enumerate(&self, root: &Path, globs: &[String]) -> Result<Vec<PathBuf>>;
}

/// Walks the tree with `walkdir` and matches with `globset`.
#[derive(Debug, Clone)]
pub struct GlobEnumerator {
    /// Whether to follow symbolic links
    pub follow_links: bool,
    /// Maximum depth for directory traversal (None = unlimited)
    pub max_depth: Option<usize>,
}

impl Default for GlobEnumerator {
    fn default() -> Self {
        Self {
            follow_links: false,
            max_depth: None,
        }
    }
}

impl GlobEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

/// Compiles `globs` into a single matcher.
pub fn build_glob_set(globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        builder.add(Glob::new(glob)?);
    }
    Ok(builder.build()?)
}

fn walk_matching(
    root: &Path,
    matcher: &GlobSet,
    follow_links: bool,
    max_depth: Option<usize>,
) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).follow_links(follow_links);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry during note enumeration");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .map(|relative| matcher.is_match(relative))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect()
}

#[async_trait]
impl NoteEnumerator for GlobEnumerator {
    async fn enumerate(&self, root: &Path, globs: &[String]) -> Result<Vec<PathBuf>> {
        let matcher = build_glob_set(globs)?;
        let root = root.to_path_buf();
        let follow_links = self.follow_links;
        let max_depth = self.max_depth;

        spawn_blocking(move || walk_matching(&root, &matcher, follow_links, max_depth))
            .await
            .map_err(|err| NoteError::Internal(format!("note enumeration panicked: {err}")))
    }
}
