//! Decides what a single watch event means for the note index.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::batcher::EventSink;
use super::event::{FsAction, RawEvent};
use crate::filter::PathFilter;
use crate::store::NoteStore;

/// Why an event left the index untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The path is not part of the note set.
    Unsupported,
    /// An `add` for a path that is already indexed.
    AlreadyIndexed,
    /// An `unlink` for a path that is not indexed.
    NotIndexed,
    /// The file could not be turned into a note.
    Unparsable,
    /// The freshly parsed note is the one already indexed.
    Unchanged,
}

/// The mutation a reconciled event resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// A note was indexed.
    Created(PathBuf),
    /// An indexed note was re-read in place.
    Updated(PathBuf),
    /// An indexed note now lives at `to`.
    Moved { from: PathBuf, to: PathBuf },
    /// An indexed note was dropped.
    Deleted(PathBuf),
    /// A directory holding `count` indexed notes was renamed to `to`.
    MovedTree {
        from: PathBuf,
        to: PathBuf,
        count: usize,
    },
    /// A directory holding `count` indexed notes went away.
    Pruned { dir: PathBuf, count: usize },
    /// Nothing changed.
    Skipped(SkipReason),
}

/// Applies watch events to the index through a [`NoteStore`].
///
/// Every entry point tolerates an index that is stale or already up to date:
/// redundant events end up as [`Reconciliation::Skipped`]. Paths outside the
/// note set that have indexed notes below them are treated as directories.
pub struct Reconciler {
    filter: PathFilter,
    store: Arc<dyn NoteStore>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("pattern", &self.filter.pattern())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(filter: PathFilter, store: Arc<dyn NoteStore>) -> Self {
        Self { filter, store }
    }

    /// Dispatches `event` to the matching entry point.
    pub async fn apply(&self, event: &RawEvent) -> Reconciliation {
        let notify = event.notify;
        let outcome = match &event.action {
            FsAction::Add(path) => self.add(path, notify).await,
            FsAction::Change(path) => self.change(path, notify).await,
            FsAction::Rename { from, to } => self.rename(from, to, notify).await,
            FsAction::Unlink(path) => self.unlink(path, notify).await,
        };
        debug!(event = %event, notify, outcome = ?outcome, "reconciled watch event");
        outcome
    }

    /// Indexes the note at `path` unless it is already known.
    pub async fn add(&self, path: &Path, notify: bool) -> Reconciliation {
        if !self.filter.is_supported(path) {
            return Reconciliation::Skipped(SkipReason::Unsupported);
        }
        if self.store.get(path).is_some() {
            return Reconciliation::Skipped(SkipReason::AlreadyIndexed);
        }
        // The file may still be mid-write; a later change event retries.
        let Some(note) = self.store.read(path).await else {
            return Reconciliation::Skipped(SkipReason::Unparsable);
        };

        self.store.add(note, notify).await;
        Reconciliation::Created(path.to_path_buf())
    }

    /// A content change is a rename onto the same path.
    pub async fn change(&self, path: &Path, notify: bool) -> Reconciliation {
        self.rename(path, path, notify).await
    }

    /// Moves the note at `from` to `to`, re-reading it from `to`.
    ///
    /// Falling back to a delete or an add always announces the result: the
    /// trailing events of a coalesced burst find nothing left to do.
    pub async fn rename(&self, from: &Path, to: &Path, notify: bool) -> Reconciliation {
        if !self.filter.is_supported(to) {
            // Moved out of the note set.
            if self.filter.is_supported(from) {
                return self.unlink(from, true).await;
            }
            if from == to {
                return Reconciliation::Skipped(SkipReason::Unsupported);
            }
            return self.rename_tree(from, to, notify).await;
        }

        let Some(previous) = self.store.get(from) else {
            return self.add(to, true).await;
        };
        let Some(next) = self.store.read(to).await else {
            return Reconciliation::Skipped(SkipReason::Unparsable);
        };
        if self.store.is_same_identity(&previous, &next) {
            return Reconciliation::Skipped(SkipReason::Unchanged);
        }

        self.store.replace(previous, next, notify).await;
        if from == to {
            Reconciliation::Updated(to.to_path_buf())
        } else {
            Reconciliation::Moved {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
            }
        }
    }

    /// Drops the note at `path`, or every note below it when `path` is a
    /// directory. Deletions are always hard.
    pub async fn unlink(&self, path: &Path, notify: bool) -> Reconciliation {
        let supported = self.filter.is_supported(path);
        if supported && let Some(note) = self.store.get(path) {
            self.store.delete(note, true, notify).await;
            return Reconciliation::Deleted(path.to_path_buf());
        }

        let under = self.store.notes_under(path);
        if under.is_empty() {
            return Reconciliation::Skipped(if supported {
                SkipReason::NotIndexed
            } else {
                SkipReason::Unsupported
            });
        }

        let count = under.len();
        for note in under {
            self.store.delete(note, true, notify).await;
        }
        Reconciliation::Pruned {
            dir: path.to_path_buf(),
            count,
        }
    }

    /// Rebases every note below the directory `from` onto `to`.
    async fn rename_tree(&self, from: &Path, to: &Path, notify: bool) -> Reconciliation {
        let under = self.store.notes_under(from);
        if under.is_empty() {
            return Reconciliation::Skipped(SkipReason::Unsupported);
        }

        let count = under.len();
        for previous in under {
            let Ok(relative) = previous.path.strip_prefix(from) else {
                continue;
            };
            let target = to.join(relative);
            let next = if self.filter.is_supported(&target) {
                self.store.read(&target).await
            } else {
                None
            };
            match next {
                Some(next) => self.store.replace(previous, next, notify).await,
                None => self.store.delete(previous, true, notify).await,
            }
        }
        Reconciliation::MovedTree {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            count,
        }
    }
}

#[async_trait]
impl EventSink for Reconciler {
    async fn handle(&self, event: RawEvent) {
        self.apply(&event).await;
    }
}
