//! # notesync core
//!
//! Keeps an in-memory collection of markdown notes in step with a directory
//! tree.
//!
//! ## Overview
//!
//! Two feeds populate the collection:
//!
//! - **Bulk load**: [`Notes::refresh`] enumerates every matching file, parses
//!   them concurrently and publishes the result as one atomic replacement.
//! - **Watch**: [`Notes::listen`] subscribes a [`WatchPrimitive`] to the root.
//!   Raw events are debounced by an [`EventBatcher`], superseded
//!   notifications are quieted by [`coalesce_batch`], and the
//!   [`Reconciler`] replays what is left against the index one event at a
//!   time.
//!
//! Downstream notifications ([`NotesEvent`]) are suspended while a batch is
//! replayed and released afterwards, so subscribers never see a half-applied
//! batch.
//!
//! ## Architecture
//!
//! - [`filter`]: path eligibility and normalization
//! - [`note`]: the note value and its identity
//! - [`reader`], [`store`], [`enumerate`]: collaborators behind traits
//! - [`state`]: the collection, change events and suspension
//! - [`loader`]: the bulk load
//! - [`fs_watch`]: batching, coalescing, reconciliation and watch primitives
//! - [`notes`]: the facade
//!
//! ## Examples
//!
//! ```no_run
//! use notesync_core::{Notes, NotesSettings};
//!
//! async fn run() -> notesync_core::Result<()> {
//!     let notes = Notes::with_defaults(NotesSettings::default().with_root("/home/me/notes"));
//!     let summary = notes.refresh().await?;
//!     println!("loaded {} notes", summary.loaded);
//!     notes.listen().await?;
//!     Ok(())
//! }
//! ```

pub mod enumerate;
pub mod error;
pub mod filter;
pub mod fs_watch;
pub mod loader;
pub mod note;
pub mod notes;
pub mod reader;
pub mod state;
pub mod store;

pub use enumerate::{GlobEnumerator, NoteEnumerator};
pub use error::{NoteError, Result};
pub use filter::{DEFAULT_NOTE_PATTERN, PathFilter, normalize_path};
pub use fs_watch::{
    EventBatcher, FlushHooks, FsWatchConfig, ManualWatchPrimitive, NotifyPrimitive, RawEvent,
    Reconciler, Reconciliation, SuspensionHooks, TracingWatchObserver, WatchConfig,
    WatchObserver, WatchPrimitive, WatchSession, coalesce_batch,
};
pub use loader::{BulkLoader, RefreshSummary};
pub use note::{Note, NotesCollection};
pub use notes::{DEFAULT_GLOBS, Notes, NotesBuilder, NotesSettings};
pub use reader::{MarkdownReader, NoteReader};
pub use state::{NotesEvent, NotesState, Suspendable};
pub use store::{NoteService, NoteStore};
