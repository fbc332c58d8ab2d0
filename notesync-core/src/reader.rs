use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::note::Note;

/// Turns a file on disk into a [`Note`].
///
/// Anything that prevents a note from being produced (missing file, read
/// failure, undecodable or empty contents) is reported as `None`; callers treat
/// that as "no note here right now", not as an error.
#[async_trait]
pub trait NoteReader: Send + Sync {
    async fn read(&self, path: &Path) -> Option<Note>;
}

/// Reads markdown notes through `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownReader;

impl MarkdownReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NoteReader for MarkdownReader {
    async fn read(&self, path: &Path) -> Option<Note> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return None,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "note metadata unavailable");
                return None;
            }
        };

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "note unreadable");
                return None;
            }
        };

        if contents.trim().is_empty() {
            return None;
        }

        let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
        Some(Note::parse(path.to_path_buf(), &contents, modified_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reads_existing_note() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.md");
        std::fs::write(&path, "# Alpha\ntext").unwrap();

        let note = MarkdownReader::new().read(&path).await.expect("note");
        assert_eq!(note.title, "Alpha");
        assert_eq!(note.path, path);
        assert!(note.modified_at.is_some());
    }

    #[tokio::test]
    async fn missing_empty_and_binary_files_yield_nothing() {
        let dir = tempdir().unwrap();
        let reader = MarkdownReader::new();

        assert!(reader.read(&dir.path().join("missing.md")).await.is_none());

        let empty = dir.path().join("empty.md");
        std::fs::write(&empty, "  \n").unwrap();
        assert!(reader.read(&empty).await.is_none());

        let binary = dir.path().join("binary.md");
        std::fs::write(&binary, [0xff, 0xfe, 0x00, 0x80]).unwrap();
        assert!(reader.read(&binary).await.is_none());

        assert!(reader.read(dir.path()).await.is_none());
    }
}
