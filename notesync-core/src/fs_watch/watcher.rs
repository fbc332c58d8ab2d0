//! Watch primitives: the thing that actually observes the directory tree.
//!
//! A primitive is handed a [`WatchHandlers`] bundle and calls
//! `add`/`change`/`rename`/`unlink` on it from whatever thread it runs on.
//! The handlers normalize paths, drop anything outside the watched root and
//! push the result into the session's [`BatchSender`].
//!
//! Directory events arrive as a single path. A directory that appears is
//! walked and each file reported as added; one that moves or disappears is
//! forwarded as is and the reconciler fans it out over the notes below it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::WatchObserver;
use super::batcher::BatchSender;
use super::event::RawEvent;
use crate::error::{NoteError, Result};
use crate::filter::{normalize_path, path_within_root};

/// Callbacks a primitive invokes for every observed change.
#[derive(Clone)]
pub struct WatchHandlers {
    root: PathBuf,
    sender: BatchSender,
    observer: Arc<dyn WatchObserver>,
}

impl fmt::Debug for WatchHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandlers")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl WatchHandlers {
    pub fn new(root: &Path, sender: BatchSender, observer: Arc<dyn WatchObserver>) -> Self {
        Self {
            root: normalize_path(root),
            sender,
            observer,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn add(&self, path: &Path) {
        if let Some(path) = self.scoped(path) {
            self.send(RawEvent::add(path));
        }
    }

    pub fn change(&self, path: &Path) {
        if let Some(path) = self.scoped(path) {
            self.send(RawEvent::change(path));
        }
    }

    /// Reports a move. A side outside the root turns it into an unlink or an
    /// add.
    pub fn rename(&self, from: &Path, to: &Path) {
        match (self.scoped(from), self.scoped(to)) {
            (Some(from), Some(to)) => self.send(RawEvent::rename(from, to)),
            // Moved out of the tree.
            (Some(from), None) => self.send(RawEvent::unlink(from)),
            // Moved into the tree.
            (None, Some(to)) => self.send(RawEvent::add(to)),
            (None, None) => {}
        }
    }

    pub fn unlink(&self, path: &Path) {
        if let Some(path) = self.scoped(path) {
            self.send(RawEvent::unlink(path));
        }
    }

    /// Reports every file below the directory `dir` as added.
    pub fn add_tree(&self, dir: &Path) {
        let files = WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file());
        for entry in files {
            self.add(entry.path());
        }
    }

    /// Reports a failure of the underlying primitive.
    pub fn error(&self, message: &str) {
        self.observer.on_error(&self.root, message);
    }

    fn scoped(&self, path: &Path) -> Option<PathBuf> {
        let path = normalize_path(path);
        if path_within_root(&path, &self.root) {
            Some(path)
        } else {
            debug!(path = %path.display(), root = %self.root.display(), "ignoring event outside watch root");
            None
        }
    }

    fn send(&self, event: RawEvent) {
        if let Err(err) = self.sender.send(event) {
            warn!(root = %self.root.display(), error = %err, "dropping watch event");
        }
    }
}

/// Subscription to a watched root. Closing stops further handler calls.
pub trait WatchHandle: Send + fmt::Debug {
    fn close(&mut self);
}

/// Something that can observe a directory tree.
pub trait WatchPrimitive: Send + Sync {
    /// Starts watching `root`, delivering changes to `handlers`.
    ///
    /// Fails when the root cannot be watched (missing, permission denied).
    fn subscribe(&self, root: &Path, handlers: WatchHandlers) -> Result<Box<dyn WatchHandle>>;
}

/// [`WatchPrimitive`] backed by `notify`'s platform watcher.
#[derive(Debug, Default, Clone)]
pub struct NotifyPrimitive {
    config: NotifyConfig,
}

impl NotifyPrimitive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: NotifyConfig) -> Self {
        Self { config }
    }
}

impl WatchPrimitive for NotifyPrimitive {
    fn subscribe(&self, root: &Path, handlers: WatchHandlers) -> Result<Box<dyn WatchHandle>> {
        let callback_handlers = handlers.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => dispatch_event(&callback_handlers, event),
                Err(err) => callback_handlers.error(&err.to_string()),
            },
            self.config,
        )
        .map_err(|err| NoteError::watch(root, err))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|err| NoteError::watch(root, err))?;

        info!(root = %root.display(), "notify watcher started");
        Ok(Box::new(NotifyHandle {
            root: handlers.root().to_path_buf(),
            watcher: Some(watcher),
        }))
    }
}

struct NotifyHandle {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl fmt::Debug for NotifyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyHandle")
            .field("root", &self.root)
            .field("active", &self.watcher.is_some())
            .finish()
    }
}

impl WatchHandle for NotifyHandle {
    fn close(&mut self) {
        // Dropping the watcher stops the notify stream.
        if self.watcher.take().is_some() {
            info!(root = %self.root.display(), "notify watcher stopped");
        }
    }
}

fn dispatch_event(handlers: &WatchHandlers, event: Event) {
    let mut paths = event.paths.iter();

    match event.kind {
        EventKind::Create(_) => {
            for path in paths {
                appeared(handlers, path);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let (Some(from), Some(to)) = (paths.next(), paths.next()) {
                handlers.rename(from, to);
                if to.is_dir() {
                    // Picks up files the rename alone cannot place, such as a
                    // directory moved in from outside the root.
                    handlers.add_tree(to);
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in paths {
                handlers.unlink(path);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in paths {
                appeared(handlers, path);
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Platforms that cannot pair renames report each side alone.
            for path in paths {
                if path.exists() {
                    appeared(handlers, path);
                } else {
                    handlers.unlink(path);
                }
            }
        }
        EventKind::Modify(_) => {
            for path in paths.filter(|path| !path.is_dir()) {
                handlers.change(path);
            }
        }
        EventKind::Remove(_) => {
            for path in paths {
                handlers.unlink(path);
            }
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }
}

fn appeared(handlers: &WatchHandlers, path: &Path) {
    if path.is_dir() {
        handlers.add_tree(path);
    } else {
        handlers.add(path);
    }
}

/// [`WatchPrimitive`] driven by hand.
///
/// Useful for embedders that already receive change notifications from
/// elsewhere, and for tests that need deterministic event streams.
#[derive(Debug, Default, Clone)]
pub struct ManualWatchPrimitive {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    subscriptions: Vec<ManualSubscription>,
    fail_next: Option<String>,
}

#[derive(Debug)]
struct ManualSubscription {
    handlers: WatchHandlers,
    active: Arc<AtomicBool>,
}

impl ManualWatchPrimitive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `subscribe` call fail with `message`.
    pub fn fail_next_subscribe(&self, message: impl Into<String>) {
        self.inner.lock().fail_next = Some(message.into());
    }

    /// Roots with an open subscription.
    pub fn active_roots(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .subscriptions
            .iter()
            .filter(|sub| sub.active.load(Ordering::SeqCst))
            .map(|sub| sub.handlers.root().to_path_buf())
            .collect()
    }

    /// Delivers an add to every open subscription.
    pub fn add(&self, path: impl AsRef<Path>) {
        self.each_active(|handlers| handlers.add(path.as_ref()));
    }

    pub fn change(&self, path: impl AsRef<Path>) {
        self.each_active(|handlers| handlers.change(path.as_ref()));
    }

    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) {
        self.each_active(|handlers| handlers.rename(from.as_ref(), to.as_ref()));
    }

    pub fn unlink(&self, path: impl AsRef<Path>) {
        self.each_active(|handlers| handlers.unlink(path.as_ref()));
    }

    fn each_active(&self, mut deliver: impl FnMut(&WatchHandlers)) {
        let mut state = self.inner.lock();
        state
            .subscriptions
            .retain(|sub| sub.active.load(Ordering::SeqCst));
        for sub in &state.subscriptions {
            deliver(&sub.handlers);
        }
    }
}

impl WatchPrimitive for ManualWatchPrimitive {
    fn subscribe(&self, root: &Path, handlers: WatchHandlers) -> Result<Box<dyn WatchHandle>> {
        let mut state = self.inner.lock();
        if let Some(message) = state.fail_next.take() {
            return Err(NoteError::watch(root, message));
        }

        let active = Arc::new(AtomicBool::new(true));
        state.subscriptions.push(ManualSubscription {
            handlers,
            active: Arc::clone(&active),
        });
        Ok(Box::new(ManualHandle {
            root: root.to_path_buf(),
            active,
        }))
    }
}

#[derive(Debug)]
struct ManualHandle {
    root: PathBuf,
    active: Arc<AtomicBool>,
}

impl WatchHandle for ManualHandle {
    fn close(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!(root = %self.root.display(), "manual watch closed");
        }
    }
}
