//! The note collaborator consumed by the reconciler and the bulk loader.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::note::Note;
use crate::reader::NoteReader;
use crate::state::NotesState;

/// Read and mutate access to the note index.
///
/// `notify` controls whether a mutation is announced to observers. `hard`
/// deletions are announced regardless of `notify`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Parses the file at `path`. `None` means there is no note to be had.
    async fn read(&self, path: &Path) -> Option<Note>;

    /// The indexed note at `path`.
    fn get(&self, path: &Path) -> Option<Note>;

    /// Indexed notes whose path lies below the directory `dir`.
    fn notes_under(&self, dir: &Path) -> Vec<Note>;

    async fn add(&self, note: Note, notify: bool);

    /// Swaps `previous` for `next`, which may live at another path.
    async fn replace(&self, previous: Note, next: Note, notify: bool);

    async fn delete(&self, note: Note, hard: bool, notify: bool);

    /// Whether `a` and `b` are the same note in the same place.
    fn is_same_identity(&self, a: &Note, b: &Note) -> bool;
}

/// Default [`NoteStore`]: a [`NoteReader`] in front of the shared
/// [`NotesState`].
pub struct NoteService<R: NoteReader = crate::reader::MarkdownReader> {
    reader: R,
    state: Arc<NotesState>,
}

impl<R: NoteReader> fmt::Debug for NoteService<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteService")
            .field("reader_type", &std::any::type_name::<R>())
            .field("state", &self.state)
            .finish()
    }
}

impl<R: NoteReader> NoteService<R> {
    pub fn new(reader: R, state: Arc<NotesState>) -> Self {
        Self { reader, state }
    }

    pub fn state(&self) -> &Arc<NotesState> {
        &self.state
    }
}

#[async_trait]
impl<R: NoteReader> NoteStore for NoteService<R> {
    async fn read(&self, path: &Path) -> Option<Note> {
        self.reader.read(path).await
    }

    fn get(&self, path: &Path) -> Option<Note> {
        self.state.get(path)
    }

    fn notes_under(&self, dir: &Path) -> Vec<Note> {
        self.state.notes_under(dir)
    }

    async fn add(&self, note: Note, notify: bool) {
        self.state.insert(note, notify);
    }

    async fn replace(&self, previous: Note, next: Note, notify: bool) {
        self.state.replace(&previous, next, notify);
    }

    async fn delete(&self, note: Note, hard: bool, notify: bool) {
        self.state.remove(&note, hard, notify);
    }

    fn is_same_identity(&self, a: &Note, b: &Note) -> bool {
        a.is_same_identity(b)
    }
}
