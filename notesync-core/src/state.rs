//! The notes state container.
//!
//! [`NotesState`] owns the authoritative [`NotesCollection`] and fans change
//! notifications out over a broadcast channel. Notifications can be suspended
//! while a watch batch is replayed: events raised in the meantime are held back
//! and released in order once the last suspension is lifted, so subscribers
//! never observe a half-applied batch.
//!
//! The `notify` flag on a mutation only silences it outside a suspension.
//! Inside one, quiet mutations are held alongside loud ones: a replayed batch
//! is announced as a whole on the outermost resume, whichever of its events
//! happened to do the work.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::note::{Note, NotesCollection};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notification emitted by [`NotesState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotesEvent {
    /// A note was indexed at `path`.
    Added { path: PathBuf },
    /// The note at `previous` was swapped for the one at `path`. Both are the
    /// same path for an in-place edit.
    Replaced { previous: PathBuf, path: PathBuf },
    /// The note at `path` left the index.
    Deleted { path: PathBuf },
    /// The whole collection was swapped out by a refresh.
    Reset { count: usize },
}

/// Something whose observable side effects can be paused and resumed.
///
/// Suspensions nest; only the outermost `resume` releases held work.
pub trait Suspendable: Send + Sync {
    /// Starts holding side effects back.
    fn suspend(&self);
    /// Lifts one suspension.
    fn resume(&self);
}

#[derive(Default)]
struct Suspension {
    depth: usize,
    held: Vec<NotesEvent>,
}

/// Shared owner of the note index.
pub struct NotesState {
    notes: RwLock<NotesCollection>,
    events: broadcast::Sender<NotesEvent>,
    suspension: Mutex<Suspension>,
}

impl fmt::Debug for NotesState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suspension = self.suspension.lock();
        f.debug_struct("NotesState")
            .field("note_count", &self.notes.read().len())
            .field("subscribers", &self.events.receiver_count())
            .field("suspension_depth", &suspension.depth)
            .field("held_events", &suspension.held.len())
            .finish()
    }
}

impl Default for NotesState {
    fn default() -> Self {
        Self::new()
    }
}

impl NotesState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            notes: RwLock::new(NotesCollection::new()),
            events,
            suspension: Mutex::new(Suspension::default()),
        }
    }

    /// Receives every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NotesEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, path: &Path) -> Option<Note> {
        self.notes.read().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.notes.read().contains_key(path)
    }

    /// Copy of the current collection.
    pub fn snapshot(&self) -> NotesCollection {
        self.notes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.notes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.read().is_empty()
    }

    /// Replaces the whole collection in one step.
    pub fn set(&self, notes: NotesCollection) {
        let count = notes.len();
        *self.notes.write() = notes;
        self.emit(NotesEvent::Reset { count });
    }

    /// Indexes `note` under its path.
    pub fn insert(&self, note: Note, notify: bool) {
        let path = note.path.clone();
        self.notes.write().insert(path.clone(), note);
        self.emit_if(notify, NotesEvent::Added { path });
    }

    /// Drops `previous` and indexes `next` in one write.
    pub fn replace(&self, previous: &Note, next: Note, notify: bool) {
        let path = next.path.clone();
        {
            let mut notes = self.notes.write();
            notes.remove(&previous.path);
            notes.insert(path.clone(), next);
        }
        self.emit_if(
            notify,
            NotesEvent::Replaced {
                previous: previous.path.clone(),
                path,
            },
        );
    }

    /// Removes `note`. A hard removal is always announced, whatever `notify`
    /// says.
    pub fn remove(&self, note: &Note, hard: bool, notify: bool) {
        let removed = self.notes.write().remove(&note.path).is_some();
        if removed {
            self.emit_if(
                hard || notify,
                NotesEvent::Deleted {
                    path: note.path.clone(),
                },
            );
        }
    }

    /// Notes whose path lies strictly below `dir`.
    pub fn notes_under(&self, dir: &Path) -> Vec<Note> {
        self.notes
            .read()
            .iter()
            .filter(|(path, _)| path.as_path() != dir && path.starts_with(dir))
            .map(|(_, note)| note.clone())
            .collect()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspension.lock().depth > 0
    }

    fn emit(&self, event: NotesEvent) {
        self.emit_if(true, event);
    }

    /// Quiet events are dropped unless a suspension is holding events back.
    fn emit_if(&self, notify: bool, event: NotesEvent) {
        let mut suspension = self.suspension.lock();
        if suspension.depth > 0 {
            suspension.held.push(event);
            return;
        }
        drop(suspension);
        if notify {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}

impl Suspendable for NotesState {
    fn suspend(&self) {
        self.suspension.lock().depth += 1;
    }

    fn resume(&self) {
        let held = {
            let mut suspension = self.suspension.lock();
            suspension.depth = suspension.depth.saturating_sub(1);
            if suspension.depth > 0 {
                return;
            }
            std::mem::take(&mut suspension.held)
        };

        for event in held {
            let _ = self.events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn note(path: &str, body: &str) -> Note {
        Note::parse(PathBuf::from(path), body, None)
    }

    #[test]
    fn insert_replace_remove_track_keys() {
        let state = NotesState::new();
        let a = note("/n/a.md", "a");
        state.insert(a.clone(), true);
        assert!(state.contains(Path::new("/n/a.md")));

        let b = note("/n/b.md", "a");
        state.replace(&a, b.clone(), true);
        assert!(!state.contains(Path::new("/n/a.md")));
        assert_eq!(state.get(Path::new("/n/b.md")), Some(b.clone()));

        state.remove(&b, true, false);
        assert!(state.is_empty());
    }

    #[test]
    fn notify_flag_gates_events_except_hard_deletes() {
        let state = NotesState::new();
        let mut rx = state.subscribe();
        let a = note("/n/a.md", "a");

        state.insert(a.clone(), false);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        state.remove(&a, true, false);
        assert_eq!(
            rx.try_recv(),
            Ok(NotesEvent::Deleted {
                path: PathBuf::from("/n/a.md")
            })
        );

        state.insert(a.clone(), false);
        state.remove(&a, false, false);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn removing_an_absent_note_is_silent() {
        let state = NotesState::new();
        let mut rx = state.subscribe();
        state.remove(&note("/n/ghost.md", "x"), true, true);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn suspension_holds_events_until_outermost_resume() {
        let state = NotesState::new();
        let mut rx = state.subscribe();

        state.suspend();
        state.suspend();
        state.insert(note("/n/a.md", "a"), true);
        state.insert(note("/n/b.md", "b"), true);
        assert!(state.is_suspended());
        // The mutation itself is visible right away.
        assert_eq!(state.len(), 2);

        state.resume();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        state.resume();
        assert!(!state.is_suspended());
        assert_eq!(
            rx.try_recv(),
            Ok(NotesEvent::Added {
                path: PathBuf::from("/n/a.md")
            })
        );
        assert_eq!(
            rx.try_recv(),
            Ok(NotesEvent::Added {
                path: PathBuf::from("/n/b.md")
            })
        );
    }

    #[test]
    fn quiet_mutations_while_suspended_are_released_on_resume() {
        let state = NotesState::new();
        let mut rx = state.subscribe();
        let old = note("/n/a.md", "old");
        state.insert(old.clone(), false);

        state.suspend();
        let edited = note("/n/a.md", "new");
        state.replace(&old, edited, false);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        state.resume();
        assert_eq!(
            rx.try_recv(),
            Ok(NotesEvent::Replaced {
                previous: PathBuf::from("/n/a.md"),
                path: PathBuf::from("/n/a.md"),
            })
        );
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn resume_without_mutations_is_silent() {
        let state = NotesState::new();
        let mut rx = state.subscribe();
        state.suspend();
        state.resume();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn notes_under_matches_whole_components() {
        let state = NotesState::new();
        state.insert(note("/n/sub/a.md", "a"), false);
        state.insert(note("/n/sub/deep/b.md", "b"), false);
        state.insert(note("/n/subway.md", "c"), false);

        let mut under: Vec<PathBuf> = state
            .notes_under(Path::new("/n/sub"))
            .into_iter()
            .map(|note| note.path)
            .collect();
        under.sort();
        assert_eq!(
            under,
            vec![PathBuf::from("/n/sub/a.md"), PathBuf::from("/n/sub/deep/b.md")]
        );
    }

    #[test]
    fn set_swaps_collection_and_announces_reset() {
        let state = NotesState::new();
        let mut rx = state.subscribe();
        state.insert(note("/n/old.md", "old"), false);

        let mut fresh = NotesCollection::new();
        let a = note("/n/a.md", "a");
        fresh.insert(a.path.clone(), a);
        state.set(fresh);

        assert!(!state.contains(Path::new("/n/old.md")));
        assert_eq!(state.len(), 1);
        assert_eq!(rx.try_recv(), Ok(NotesEvent::Reset { count: 1 }));
    }
}
