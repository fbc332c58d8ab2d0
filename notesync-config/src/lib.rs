//! Configuration library for notesync.
//!
//! Loads [`NotesConfig`] from a file, inline JSON or defaults, applies
//! environment overrides, checks guard rails and converts the result into the
//! core's [`notesync_core::NotesSettings`].

pub mod models;
pub mod util;
pub mod validation;

pub use models::notes::{NotesConfig, NotesConfigSource};
pub use validation::ConfigValidationError;
