//! The public facade tying the loader, the index and the watch together.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::info;

use crate::enumerate::{GlobEnumerator, NoteEnumerator};
use crate::error::Result;
use crate::filter::{PathFilter, normalize_path};
use crate::fs_watch::{
    FsWatchConfig, NotifyPrimitive, Reconciler, SessionParts, SuspensionHooks,
    TracingWatchObserver, WatchObserver, WatchPrimitive, WatchSession,
};
use crate::loader::{BulkLoader, RefreshSummary};
use crate::note::{Note, NotesCollection};
use crate::reader::MarkdownReader;
use crate::state::{NotesEvent, NotesState, Suspendable};
use crate::store::{NoteService, NoteStore};

/// Default globs used to enumerate notes.
pub const DEFAULT_GLOBS: [&str; 2] = ["**/*.md", "**/*.markdown"];

/// Runtime settings for [`Notes`].
#[derive(Debug, Clone)]
pub struct NotesSettings {
    /// Directory holding the notes. `None` disables loading and watching.
    pub root: Option<PathBuf>,
    /// Globs matched against paths relative to `root` during a refresh.
    pub globs: Vec<String>,
    /// Eligibility test applied to watch events.
    pub filter: PathFilter,
    pub watch: FsWatchConfig,
}

impl Default for NotesSettings {
    fn default() -> Self {
        Self {
            root: None,
            globs: DEFAULT_GLOBS.iter().map(|glob| glob.to_string()).collect(),
            filter: PathFilter::default(),
            watch: FsWatchConfig::default(),
        }
    }
}

impl NotesSettings {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }
}

/// Assembles a [`Notes`] with custom collaborators.
pub struct NotesBuilder {
    settings: NotesSettings,
    state: Option<Arc<NotesState>>,
    store: Option<Arc<dyn NoteStore>>,
    enumerator: Option<Arc<dyn NoteEnumerator>>,
    primitive: Option<Arc<dyn WatchPrimitive>>,
    observer: Option<Arc<dyn WatchObserver>>,
    suspendables: Vec<Arc<dyn Suspendable>>,
}

impl fmt::Debug for NotesBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotesBuilder")
            .field("settings", &self.settings)
            .field("custom_store", &self.store.is_some())
            .field("custom_enumerator", &self.enumerator.is_some())
            .field("custom_primitive", &self.primitive.is_some())
            .field("suspendables", &self.suspendables.len())
            .finish_non_exhaustive()
    }
}

impl NotesBuilder {
    pub fn new(settings: NotesSettings) -> Self {
        Self {
            settings,
            state: None,
            store: None,
            enumerator: None,
            primitive: None,
            observer: None,
            suspendables: Vec::new(),
        }
    }

    pub fn state(mut self, state: Arc<NotesState>) -> Self {
        self.state = Some(state);
        self
    }

    /// Replaces the default [`NoteService`]. The store should read from and
    /// write to the same [`NotesState`] handed to [`NotesBuilder::state`].
    pub fn store(mut self, store: Arc<dyn NoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn enumerator(mut self, enumerator: Arc<dyn NoteEnumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    pub fn primitive(mut self, primitive: Arc<dyn WatchPrimitive>) -> Self {
        self.primitive = Some(primitive);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn WatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Registers an extra target suspended for the duration of each flush,
    /// after the notes state.
    pub fn suspend_during_flush(mut self, target: Arc<dyn Suspendable>) -> Self {
        self.suspendables.push(target);
        self
    }

    pub fn build(self) -> Notes {
        let state = self.state.unwrap_or_else(|| Arc::new(NotesState::new()));
        let store = self.store.unwrap_or_else(|| {
            Arc::new(NoteService::new(MarkdownReader::new(), Arc::clone(&state)))
        });
        let enumerator = self
            .enumerator
            .unwrap_or_else(|| Arc::new(GlobEnumerator::new()));

        let hooks = self.suspendables.into_iter().fold(
            SuspensionHooks::default().with(Arc::clone(&state) as Arc<dyn Suspendable>),
            SuspensionHooks::with,
        );

        Notes {
            loader: BulkLoader::new(enumerator, Arc::clone(&store)),
            settings: self.settings,
            state,
            store,
            primitive: self.primitive.unwrap_or_else(|| Arc::new(NotifyPrimitive::new())),
            observer: self.observer.unwrap_or_else(|| Arc::new(TracingWatchObserver)),
            hooks,
            session: Mutex::new(None),
        }
    }
}

/// In-memory note collection kept in step with a directory.
pub struct Notes {
    settings: NotesSettings,
    state: Arc<NotesState>,
    store: Arc<dyn NoteStore>,
    loader: BulkLoader,
    primitive: Arc<dyn WatchPrimitive>,
    observer: Arc<dyn WatchObserver>,
    hooks: SuspensionHooks,
    session: Mutex<Option<WatchSession>>,
}

impl fmt::Debug for Notes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Notes");
        debug
            .field("settings", &self.settings)
            .field("state", &self.state);
        match self.session.try_lock() {
            Ok(guard) => {
                debug.field("listening", &guard.is_some());
            }
            Err(_) => {
                debug.field("session", &"<locked>");
            }
        }
        debug.finish_non_exhaustive()
    }
}

impl Notes {
    pub fn builder(settings: NotesSettings) -> NotesBuilder {
        NotesBuilder::new(settings)
    }

    /// Markdown reader, glob enumerator and `notify` watcher.
    pub fn with_defaults(settings: NotesSettings) -> Self {
        NotesBuilder::new(settings).build()
    }

    pub fn settings(&self) -> &NotesSettings {
        &self.settings
    }

    pub fn state(&self) -> &Arc<NotesState> {
        &self.state
    }

    /// Change notifications for the collection.
    pub fn subscribe(&self) -> broadcast::Receiver<NotesEvent> {
        self.state.subscribe()
    }

    /// Rebuilds the whole collection from disk and publishes it at once.
    ///
    /// Without a configured root the collection is left as is.
    pub async fn refresh(&self) -> Result<RefreshSummary> {
        let Some(root) = self.settings.root.as_deref() else {
            info!("no notes root configured, skipping refresh");
            return Ok(RefreshSummary::default());
        };

        let (notes, summary) = self.loader.load(root, &self.settings.globs).await?;
        self.set(notes);
        Ok(summary)
    }

    /// (Re)starts watching the configured root.
    ///
    /// Any previous session is closed and its replay task awaited before the
    /// new watch is opened. Without a configured root this only closes.
    pub async fn listen(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            previous.close().await;
        }

        let Some(root) = self.settings.root.as_deref() else {
            info!("no notes root configured, watch disabled");
            return Ok(());
        };

        let started = WatchSession::start(root, self.primitive.as_ref(), self.session_parts()).await?;
        *session = Some(started);
        Ok(())
    }

    /// Stops the active watch, if any, and waits for its replay to finish.
    pub async fn close(&self) {
        if let Some(previous) = self.session.lock().await.take() {
            previous.close().await;
        }
    }

    pub async fn is_listening(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// The note at `path`, normalized the same way as the index keys.
    pub fn get(&self, path: &Path) -> Option<Note> {
        self.store.get(&normalize_path(path))
    }

    /// Copy of the whole collection.
    pub fn snapshot(&self) -> NotesCollection {
        self.state.snapshot()
    }

    /// Replaces the whole collection.
    pub fn set(&self, notes: NotesCollection) {
        self.state.set(notes);
    }

    fn session_parts(&self) -> SessionParts {
        let reconciler = Reconciler::new(self.settings.filter.clone(), Arc::clone(&self.store));
        SessionParts {
            config: self.settings.watch.clone(),
            sink: Arc::new(reconciler),
            hooks: Arc::new(self.hooks.clone()),
            observer: Arc::clone(&self.observer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_watch::{ManualWatchPrimitive, NoopWatchObserver};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn manual_notes(root: Option<&Path>, primitive: &ManualWatchPrimitive) -> Notes {
        let mut settings = NotesSettings::default();
        settings.root = root.map(Path::to_path_buf);
        Notes::builder(settings)
            .primitive(Arc::new(primitive.clone()))
            .observer(Arc::new(NoopWatchObserver))
            .build()
    }

    #[tokio::test]
    async fn without_root_nothing_is_loaded_or_watched() -> Result<()> {
        let primitive = ManualWatchPrimitive::new();
        let notes = manual_notes(None, &primitive);

        assert_eq!(notes.refresh().await?, RefreshSummary::default());
        notes.listen().await?;
        assert!(!notes.is_listening().await);
        assert!(primitive.active_roots().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn listen_replaces_previous_session() -> Result<()> {
        let dir = tempdir()?;
        let primitive = ManualWatchPrimitive::new();
        let notes = manual_notes(Some(dir.path()), &primitive);

        notes.listen().await?;
        notes.listen().await?;
        assert_eq!(primitive.active_roots().len(), 1);
        assert!(notes.is_listening().await);

        notes.close().await;
        assert!(!notes.is_listening().await);
        assert!(primitive.active_roots().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failed_listen_leaves_no_session() -> Result<()> {
        let dir = tempdir()?;
        let primitive = ManualWatchPrimitive::new();
        let notes = manual_notes(Some(dir.path()), &primitive);

        notes.listen().await?;
        primitive.fail_next_subscribe("permission denied");
        assert!(notes.listen().await.is_err());
        assert!(!notes.is_listening().await);
        assert!(primitive.active_roots().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn flush_notifications_arrive_after_the_batch() -> Result<()> {
        let dir = tempdir()?;
        let primitive = ManualWatchPrimitive::new();
        let notes = manual_notes(Some(dir.path()), &primitive);
        notes.refresh().await?;
        let mut events = notes.subscribe();

        notes.listen().await?;
        let a = dir.path().join("a.md");
        fs::write(&a, "# A\n")?;
        primitive.add(&a);
        primitive.change(&a);
        tokio::time::sleep(Duration::from_millis(300)).await;

        let added = events.try_recv().expect("added event");
        assert!(matches!(added, NotesEvent::Added { .. }));
        // The change carried no new content.
        assert!(events.try_recv().is_err());
        assert!(notes.get(&a).is_some());

        notes.close().await;
        Ok(())
    }

    #[test]
    fn set_replaces_the_collection() {
        let notes = manual_notes(None, &ManualWatchPrimitive::new());
        let note = Note::parse(PathBuf::from("/n/a.md"), "# A\n", None);
        let mut collection = NotesCollection::new();
        collection.insert(note.path.clone(), note.clone());

        notes.set(collection);
        assert_eq!(notes.get(Path::new("/n/a.md")), Some(note));
        assert_eq!(notes.snapshot().len(), 1);
    }
}
