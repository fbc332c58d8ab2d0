//! Filesystem watch pipeline for the note index.
//!
//! A thin layer over a [`WatchPrimitive`] that debounces raw notifications
//! into batches, quiets superseded notifications and replays what is left
//! through the [`Reconciler`], one event at a time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod batcher;
pub mod coalesce;
pub mod event;
pub mod reconciler;
pub mod watcher;

pub use batcher::{
    BatchSender, EventBatcher, EventSink, FlushHooks, NoopFlushHooks, SuspensionHooks,
};
pub use coalesce::coalesce_batch;
pub use event::{FsAction, RawEvent, WatchOp};
pub use reconciler::{Reconciler, Reconciliation, SkipReason};
pub use watcher::{
    ManualWatchPrimitive, NotifyPrimitive, WatchHandle, WatchHandlers, WatchPrimitive,
};

use crate::error::Result;

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_WINDOW_MS: u64 = 100;

/// Serializable watch settings as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_window_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
        }
    }
}

/// Configuration knobs for watch processing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FsWatchConfig {
    /// Quiet period that must pass after the last event before a batch is
    /// replayed.
    pub debounce_window: Duration,
}

impl Default for FsWatchConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(DEFAULT_DEBOUNCE_WINDOW_MS),
        }
    }
}

impl From<WatchConfig> for FsWatchConfig {
    fn from(cfg: WatchConfig) -> Self {
        Self {
            debounce_window: Duration::from_millis(cfg.debounce_window_ms.max(1)),
        }
    }
}

/// Observer hook for surfacing watcher errors.
pub trait WatchObserver: Send + Sync {
    fn on_error(&self, root: &Path, error: &str);
}

/// Logs watcher errors through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWatchObserver;

impl WatchObserver for TracingWatchObserver {
    fn on_error(&self, root: &Path, error: &str) {
        warn!(root = %root.display(), error, "file watcher reported an error");
    }
}

/// No-op observer used when nothing is wired up.
pub struct NoopWatchObserver;

impl WatchObserver for NoopWatchObserver {
    fn on_error(&self, _root: &Path, _error: &str) {}
}

impl fmt::Debug for NoopWatchObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopWatchObserver")
    }
}

/// Everything a session needs besides the root it watches.
#[derive(Clone)]
pub struct SessionParts {
    pub config: FsWatchConfig,
    pub sink: Arc<dyn EventSink>,
    pub hooks: Arc<dyn FlushHooks>,
    pub observer: Arc<dyn WatchObserver>,
}

impl fmt::Debug for SessionParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParts")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One active watch: a primitive subscription feeding an [`EventBatcher`].
pub struct WatchSession {
    root: PathBuf,
    handle: Box<dyn WatchHandle>,
    batcher: EventBatcher,
}

impl fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("root", &self.root)
            .field("handle", &self.handle)
            .field("batcher", &self.batcher)
            .finish()
    }
}

impl WatchSession {
    /// Spawns the batcher and subscribes `primitive` to `root`.
    ///
    /// If the subscription fails the batcher is shut down again and the
    /// primitive's error is returned.
    pub async fn start(
        root: &Path,
        primitive: &dyn WatchPrimitive,
        parts: SessionParts,
    ) -> Result<Self> {
        let batcher = EventBatcher::spawn(parts.config.debounce_window, parts.sink, parts.hooks);
        let handlers = WatchHandlers::new(root, batcher.sender(), parts.observer);
        let root = handlers.root().to_path_buf();

        match primitive.subscribe(&root, handlers) {
            Ok(handle) => {
                info!(
                    root = %root.display(),
                    debounce_ms = parts.config.debounce_window.as_millis() as u64,
                    "watch session started"
                );
                Ok(Self {
                    root,
                    handle,
                    batcher,
                })
            }
            Err(err) => {
                batcher.close().await;
                Err(err)
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Releases the watch and waits for the replay task to finish.
    pub async fn close(mut self) {
        self.handle.close();
        self.batcher.close().await;
        info!(root = %self.root.display(), "watch session closed");
    }
}
