//! Initial full build of the note collection.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info};

use crate::enumerate::NoteEnumerator;
use crate::error::Result;
use crate::filter::normalize_path;
use crate::note::NotesCollection;
use crate::store::NoteStore;

/// Outcome counters for one refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Distinct paths returned by enumeration.
    pub discovered: usize,
    /// Paths that parsed into a note.
    pub loaded: usize,
    /// Paths that yielded no note.
    pub skipped: usize,
}

/// Enumerates and parses every matching file under a root.
pub struct BulkLoader {
    enumerator: Arc<dyn NoteEnumerator>,
    store: Arc<dyn NoteStore>,
}

impl fmt::Debug for BulkLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkLoader").finish_non_exhaustive()
    }
}

impl BulkLoader {
    pub fn new(enumerator: Arc<dyn NoteEnumerator>, store: Arc<dyn NoteStore>) -> Self {
        Self { enumerator, store }
    }

    /// Builds a fresh collection; the caller publishes it.
    ///
    /// Files are parsed concurrently. Files that yield no note are left out
    /// and not retried.
    pub async fn load(
        &self,
        root: &Path,
        globs: &[String],
    ) -> Result<(NotesCollection, RefreshSummary)> {
        let started = Instant::now();
        let root = normalize_path(root);

        let mut seen = HashSet::new();
        let paths: Vec<PathBuf> = self
            .enumerator
            .enumerate(&root, globs)
            .await?
            .into_iter()
            .map(|path| normalize_path(&path))
            .filter(|path| seen.insert(path.clone()))
            .collect();

        let store = Arc::clone(&self.store);
        let reads = paths.iter().map(|path| {
            let store = Arc::clone(&store);
            async move { store.read(path).await }
        });
        let parsed = join_all(reads).await;

        let mut notes = NotesCollection::with_capacity(paths.len());
        for (path, note) in paths.iter().zip(parsed) {
            match note {
                Some(note) => {
                    notes.insert(path.clone(), note);
                }
                None => debug!(path = %path.display(), "skipping file with no note"),
            }
        }

        let summary = RefreshSummary {
            discovered: paths.len(),
            loaded: notes.len(),
            skipped: paths.len() - notes.len(),
        };
        info!(
            root = %root.display(),
            discovered = summary.discovered,
            loaded = summary.loaded,
            skipped = summary.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "bulk note load finished"
        );
        Ok((notes, summary))
    }
}
