//! Note values and the collection they live in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Mapping from normalized path to note. Order is irrelevant.
pub type NotesCollection = HashMap<PathBuf, Note>;

/// A parsed note file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub path: PathBuf,
    pub title: String,
    pub tags: Vec<String>,
    pub body: String,
    pub checksum: String,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Builds a note from raw file contents.
    ///
    /// A leading front-matter block delimited by `---` lines is split off;
    /// only its `tags:` entry is interpreted. The title is the first `# `
    /// heading of the body, falling back to the file stem.
    pub fn parse(path: PathBuf, contents: &str, modified_at: Option<DateTime<Utc>>) -> Self {
        let (front_matter, body) = split_front_matter(contents);
        let tags = front_matter.map(parse_tags).unwrap_or_default();
        let title = body
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|heading| heading.trim().to_string())
            .filter(|heading| !heading.is_empty())
            .unwrap_or_else(|| file_stem(&path));

        Self {
            checksum: checksum(contents),
            path,
            title,
            tags,
            body: body.to_string(),
            modified_at,
        }
    }

    /// Two notes are the same logical note when they sit at the same path
    /// and carry byte-identical contents.
    pub fn is_same_identity(&self, other: &Note) -> bool {
        self.path == other.path && self.checksum == other.checksum
    }
}

/// Content checksum: URL-safe base64 of the first 16 bytes of the SHA-256.
pub fn checksum(contents: &str) -> String {
    let digest = Sha256::digest(contents.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..16])
}

fn split_front_matter(contents: &str) -> (Option<&str>, &str) {
    let Some(rest) = contents
        .strip_prefix("---\n")
        .or_else(|| contents.strip_prefix("---\r\n"))
    else {
        return (None, contents);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(front), body.trim_start_matches(['\r', '\n']));
        }
        offset += line.len();
    }

    (None, contents)
}

fn parse_tags(front_matter: &str) -> Vec<String> {
    let Some(raw) = front_matter
        .lines()
        .find_map(|line| line.trim().strip_prefix("tags:"))
    else {
        return Vec::new();
    };

    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|tag| tag.trim().trim_matches(['"', '\'']).to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
