use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use notesync_config::{NotesConfig, NotesConfigSource};
use notesync_core::{Notes, NotesEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "notesyncd")]
#[command(about = "Keeps an in-memory index of a markdown notes directory in sync with disk")]
struct Cli {
    /// Notes directory (overrides config and NOTES_PATH)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Debounce window for filesystem events in milliseconds (overrides config)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Load the collection once and exit without watching
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file_loaded = dotenvy::dotenv().is_ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,notesync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if env_file_loaded {
        info!("loaded .env file");
    }

    let (mut config, source) =
        NotesConfig::load_from_env().context("failed to load notes configuration")?;
    match &source {
        NotesConfigSource::Default => info!("notes config: built-in defaults"),
        NotesConfigSource::EnvPath(path) => {
            info!(path = %path.display(), "notes config loaded from env path")
        }
        NotesConfigSource::EnvInline => info!("notes config loaded from inline environment json"),
        NotesConfigSource::File(path) => {
            info!(path = %path.display(), "notes config loaded from file")
        }
    }

    if let Some(root) = cli.root {
        config.root = Some(root);
    }
    if let Some(debounce_ms) = cli.debounce_ms {
        config.watch.debounce_window_ms = debounce_ms;
    }

    let settings = config
        .into_settings()
        .context("invalid notes configuration")?;
    match &settings.root {
        Some(root) => info!(
            root = %root.display(),
            globs = ?settings.globs,
            pattern = settings.filter.pattern(),
            debounce_ms = settings.watch.debounce_window.as_millis() as u64,
            "notes configuration in effect"
        ),
        None => warn!("No NOTES_PATH configured - nothing will be loaded or watched"),
    }

    let notes = Notes::with_defaults(settings);
    let mut events = notes.subscribe();

    let summary = notes.refresh().await.context("initial note load failed")?;
    info!(
        discovered = summary.discovered,
        loaded = summary.loaded,
        skipped = summary.skipped,
        "initial note load complete"
    );
    if cli.once {
        return Ok(());
    }

    notes.listen().await.context("failed to start watching notes")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => log_event(&event, notes.state().len()),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "note event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    notes.close().await;
    info!("notesyncd stopped");
    Ok(())
}

fn log_event(event: &NotesEvent, total: usize) {
    match event {
        NotesEvent::Added { path } => info!(path = %path.display(), total, "note added"),
        NotesEvent::Replaced { previous, path } if previous == path => {
            info!(path = %path.display(), total, "note updated")
        }
        NotesEvent::Replaced { previous, path } => info!(
            from = %previous.display(),
            to = %path.display(),
            total,
            "note moved"
        ),
        NotesEvent::Deleted { path } => info!(path = %path.display(), total, "note deleted"),
        NotesEvent::Reset { count } => info!(count, "note collection replaced"),
    }
}
