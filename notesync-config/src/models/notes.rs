use anyhow::{Context, anyhow};
use notesync_core::enumerate::build_glob_set;
use notesync_core::{
    DEFAULT_GLOBS, DEFAULT_NOTE_PATTERN, FsWatchConfig, NotesSettings, PathFilter, WatchConfig,
};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::util::{non_blank, parse_csv};
use crate::validation::ConfigValidationError;

fn default_globs() -> Vec<String> {
    DEFAULT_GLOBS.iter().map(|glob| glob.to_string()).collect()
}

fn default_pattern() -> String {
    DEFAULT_NOTE_PATTERN.to_string()
}

/// Source that produced the notes configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NotesConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Where notes live and how they are picked up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotesConfig {
    /// Directory holding the notes. Leave unset to run without loading or
    /// watching anything.
    pub root: Option<PathBuf>,
    /// Globs, relative to `root`, enumerated during a full refresh.
    #[serde(default = "default_globs")]
    pub globs: Vec<String>,
    /// Regex a path must match for watch events to touch the index.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Debouncing of filesystem events.
    pub watch: WatchConfig,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            root: None,
            globs: default_globs(),
            pattern: default_pattern(),
            watch: WatchConfig::default(),
        }
    }
}

impl NotesConfig {
    /// Load notes configuration using environment variables.
    /// Evaluation order:
    /// 1) `$NOTES_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$NOTES_CONFIG_JSON` (inline JSON),
    /// 3) the first default file found in the working directory,
    /// 4) defaults.
    ///
    /// `$NOTES_PATH`, `$NOTES_GLOBS` and `$NOTES_DEBOUNCE_MS` then override
    /// single fields.
    pub fn load_from_env() -> anyhow::Result<(Self, NotesConfigSource)> {
        Self::load_with(|name| env::var(name).ok(), Path::new("."))
    }

    /// Same as [`NotesConfig::load_from_env`], with variables read through
    /// `lookup` and default files searched under `base_dir`.
    pub fn load_with(
        lookup: impl Fn(&str) -> Option<String>,
        base_dir: &Path,
    ) -> anyhow::Result<(Self, NotesConfigSource)> {
        let (mut config, source) = Self::load_base(&lookup, base_dir)?;
        config.apply_overrides(&lookup)?;
        debug!(source = ?source, root = ?config.root, "notes configuration loaded");
        Ok((config, source))
    }

    fn load_base(
        lookup: &impl Fn(&str) -> Option<String>,
        base_dir: &Path,
    ) -> anyhow::Result<(Self, NotesConfigSource)> {
        if let Some(path_str) = non_blank(lookup, "NOTES_CONFIG_PATH") {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, NotesConfigSource::EnvPath(path)));
        }

        if let Some(raw) = non_blank(lookup, "NOTES_CONFIG_JSON") {
            let parsed = Self::parse_json(&raw).context("failed to parse NOTES_CONFIG_JSON")?;
            return Ok((parsed, NotesConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file(base_dir) {
            let config = Self::load_from_file(&path)?;
            return Ok((config, NotesConfigSource::File(path)));
        }

        Ok((Self::default(), NotesConfigSource::Default))
    }

    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(root) = non_blank(lookup, "NOTES_PATH") {
            self.root = Some(PathBuf::from(root.trim()));
        }

        if let Some(raw) = non_blank(lookup, "NOTES_GLOBS") {
            self.globs = parse_csv(&raw);
        }

        if let Some(raw) = non_blank(lookup, "NOTES_DEBOUNCE_MS") {
            self.watch.debounce_window_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("NOTES_DEBOUNCE_MS must be an integer, got `{raw}`"))?;
        }

        Ok(())
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read notes config from {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents)
                .with_context(|| format!("invalid notes config {}", path.display())),
            Some("toml") | Some("tml") => toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid notes config {}: {}", path.display(), err)),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        // Try TOML first, then JSON for convenience.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse notes config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(|err| anyhow!("invalid notes config json: {err}"))
    }

    fn find_default_file(base_dir: &Path) -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "notesync.toml",
            "notesync.json",
            "config/notesync.toml",
            "config/notesync.json",
        ];

        CANDIDATES
            .iter()
            .map(|candidate| base_dir.join(candidate))
            .find(|path| path.exists())
    }

    /// Checks the guard rails without touching the core.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.globs.is_empty() {
            return Err(ConfigValidationError::NoGlobs);
        }
        for glob in &self.globs {
            build_glob_set(std::slice::from_ref(glob)).map_err(|err| {
                ConfigValidationError::InvalidGlob {
                    glob: glob.clone(),
                    reason: err.to_string(),
                }
            })?;
        }

        self.path_filter()?;

        if self.watch.debounce_window_ms == 0 {
            return Err(ConfigValidationError::ZeroDebounceWindow);
        }

        if let Some(root) = &self.root
            && !root.is_dir()
        {
            return Err(ConfigValidationError::RootNotDirectory(root.clone()));
        }

        Ok(())
    }

    /// Validates and converts into core settings.
    pub fn into_settings(self) -> Result<NotesSettings, ConfigValidationError> {
        self.validate()?;
        let filter = self.path_filter()?;

        Ok(NotesSettings {
            root: self.root,
            globs: self.globs,
            filter,
            watch: FsWatchConfig::from(self.watch),
        })
    }

    fn path_filter(&self) -> Result<PathFilter, ConfigValidationError> {
        PathFilter::new(&self.pattern).map_err(|err| ConfigValidationError::InvalidPattern {
            pattern: self.pattern.clone(),
            reason: err.to_string(),
        })
    }
}
