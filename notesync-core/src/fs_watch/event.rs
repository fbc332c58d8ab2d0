use std::fmt;
use std::path::{Path, PathBuf};

/// The four operations a watch can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchOp {
    Add,
    Change,
    Rename,
    Unlink,
}

/// What happened on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsAction {
    Add(PathBuf),
    Change(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
    Unlink(PathBuf),
}

impl FsAction {
    pub fn op(&self) -> WatchOp {
        match self {
            FsAction::Add(_) => WatchOp::Add,
            FsAction::Change(_) => WatchOp::Change,
            FsAction::Rename { .. } => WatchOp::Rename,
            FsAction::Unlink(_) => WatchOp::Unlink,
        }
    }

    /// The path the action is about; for renames, the source.
    pub fn path(&self) -> &Path {
        match self {
            FsAction::Add(path) | FsAction::Change(path) | FsAction::Unlink(path) => path,
            FsAction::Rename { from, .. } => from,
        }
    }
}

/// A queued watch event together with its notification flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub action: FsAction,
    /// Whether applying this event should notify observers.
    pub notify: bool,
}

impl RawEvent {
    pub fn new(action: FsAction) -> Self {
        Self {
            action,
            notify: true,
        }
    }

    pub fn add(path: impl Into<PathBuf>) -> Self {
        Self::new(FsAction::Add(path.into()))
    }

    pub fn change(path: impl Into<PathBuf>) -> Self {
        Self::new(FsAction::Change(path.into()))
    }

    pub fn rename(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::new(FsAction::Rename {
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn unlink(path: impl Into<PathBuf>) -> Self {
        Self::new(FsAction::Unlink(path.into()))
    }

    pub fn op(&self) -> WatchOp {
        self.action.op()
    }

    pub fn with_notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            FsAction::Add(path) => write!(f, "add {}", path.display()),
            FsAction::Change(path) => write!(f, "change {}", path.display()),
            FsAction::Rename { from, to } => {
                write!(f, "rename {} -> {}", from.display(), to.display())
            }
            FsAction::Unlink(path) => write!(f, "unlink {}", path.display()),
        }
    }
}
