use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notesync_core::fs_watch::NoopWatchObserver;
use notesync_core::{
    ManualWatchPrimitive, Notes, NotesEvent, NotesSettings, NotifyPrimitive, RefreshSummary,
    Result, normalize_path,
};
use tempfile::TempDir;

/// Longer than the default debounce window.
const SETTLE: Duration = Duration::from_millis(500);

struct Workspace {
    dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let root = normalize_path(dir.path());
        Ok(Self { dir, root })
    }

    fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    fn notes(&self, primitive: &ManualWatchPrimitive) -> Notes {
        Notes::builder(NotesSettings::default().with_root(self.dir.path()))
            .primitive(Arc::new(primitive.clone()))
            .observer(Arc::new(NoopWatchObserver))
            .build()
    }
}

fn keys(notes: &Notes) -> Vec<PathBuf> {
    let mut keys: Vec<PathBuf> = notes.snapshot().into_keys().collect();
    keys.sort();
    keys
}

#[tokio::test(start_paused = true)]
async fn refresh_then_watch_keeps_collection_in_step() -> Result<()> {
    let ws = Workspace::new()?;
    let a = ws.write("a.md", "# A\n")?;
    let b = ws.write("b.md", "# B\n")?;
    let primitive = ManualWatchPrimitive::new();
    let notes = ws.notes(&primitive);

    let summary = notes.refresh().await?;
    assert_eq!(summary.loaded, 2);
    assert_eq!(keys(&notes), vec![a.clone(), b.clone()]);

    notes.listen().await?;

    let c = ws.write("c.md", "# C\n")?;
    primitive.add(&c);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(notes.snapshot().len(), 3);

    fs::remove_file(&a)?;
    primitive.unlink(&a);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(keys(&notes), vec![b, c]);
    assert!(notes.get(&a).is_none());

    notes.close().await;
    Ok(())
}

#[tokio::test]
async fn refresh_skips_files_without_a_note() -> Result<()> {
    let ws = Workspace::new()?;
    for name in ["one.md", "two.md", "nested/three.md", "nested/deeper/four.markdown"] {
        ws.write(name, &format!("# {name}\n"))?;
    }
    ws.write("blank.md", "\n\n")?;
    fs::write(ws.root.join("latin1.md"), [0x23_u8, 0x20, 0xe9, 0xff])?;
    ws.write("readme.txt", "not a note")?;

    let notes = ws.notes(&ManualWatchPrimitive::new());
    let summary = notes.refresh().await?;

    assert_eq!(
        summary,
        RefreshSummary {
            discovered: 6,
            loaded: 4,
            skipped: 2,
        }
    );
    assert_eq!(notes.snapshot().len(), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rename_with_identical_content_moves_the_entry() -> Result<()> {
    let ws = Workspace::new()?;
    let a = ws.write("a.md", "# Same\n")?;
    let primitive = ManualWatchPrimitive::new();
    let notes = ws.notes(&primitive);
    notes.refresh().await?;
    notes.listen().await?;

    let b = ws.root.join("b.md");
    fs::rename(&a, &b)?;
    primitive.rename(&a, &b);
    tokio::time::sleep(SETTLE).await;

    assert!(notes.get(&a).is_none());
    assert_eq!(notes.get(&b).map(|note| note.title), Some("Same".to_string()));

    notes.close().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rename_to_ineligible_name_removes_the_entry() -> Result<()> {
    let ws = Workspace::new()?;
    let a = ws.write("a.md", "# A\n")?;
    let primitive = ManualWatchPrimitive::new();
    let notes = ws.notes(&primitive);
    notes.refresh().await?;
    notes.listen().await?;

    let txt = ws.root.join("a.txt");
    fs::rename(&a, &txt)?;
    primitive.rename(&a, &txt);
    tokio::time::sleep(SETTLE).await;

    assert!(notes.snapshot().is_empty());

    notes.close().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn add_then_unlink_in_one_window_nets_out() -> Result<()> {
    let ws = Workspace::new()?;
    let primitive = ManualWatchPrimitive::new();
    let notes = ws.notes(&primitive);
    notes.refresh().await?;
    let mut events = notes.subscribe();
    notes.listen().await?;

    let tmp = ws.write("scratch.md", "# Scratch\n")?;
    primitive.add(&tmp);
    primitive.unlink(&tmp);
    tokio::time::sleep(SETTLE).await;

    assert!(notes.get(&tmp).is_none());
    assert_eq!(events.try_recv().ok(), Some(NotesEvent::Added { path: tmp.clone() }));
    assert_eq!(events.try_recv().ok(), Some(NotesEvent::Deleted { path: tmp }));

    notes.close().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn burst_of_changes_notifies_once() -> Result<()> {
    let ws = Workspace::new()?;
    let a = ws.write("a.md", "# v0\n")?;
    let primitive = ManualWatchPrimitive::new();
    let notes = ws.notes(&primitive);
    notes.refresh().await?;
    let mut events = notes.subscribe();
    notes.listen().await?;

    for version in 1..=3 {
        ws.write("a.md", &format!("# v{version}\n"))?;
        primitive.change(&a);
    }
    tokio::time::sleep(SETTLE).await;

    assert_eq!(notes.get(&a).map(|note| note.title), Some("v3".to_string()));
    // The first, quieted change does the work; the batch still announces it.
    assert_eq!(
        events.try_recv().ok(),
        Some(NotesEvent::Replaced {
            previous: a.clone(),
            path: a
        })
    );
    assert!(events.try_recv().is_err());

    notes.close().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn repeated_change_of_untracked_file_announces_one_add() -> Result<()> {
    let ws = Workspace::new()?;
    let primitive = ManualWatchPrimitive::new();
    let notes = ws.notes(&primitive);
    notes.refresh().await?;
    let mut events = notes.subscribe();
    notes.listen().await?;

    let x = ws.write("x.md", "# X\n")?;
    primitive.change(&x);
    primitive.change(&x);
    tokio::time::sleep(SETTLE).await;

    assert!(notes.get(&x).is_some());
    assert_eq!(events.try_recv().ok(), Some(NotesEvent::Added { path: x }));
    assert!(events.try_recv().is_err());

    notes.close().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn renamed_directory_moves_its_notes() -> Result<()> {
    let ws = Workspace::new()?;
    ws.write("sub/a.md", "# A\n")?;
    ws.write("sub/deep/b.md", "# B\n")?;
    let primitive = ManualWatchPrimitive::new();
    let notes = ws.notes(&primitive);
    notes.refresh().await?;
    notes.listen().await?;

    let (sub, moved) = (ws.root.join("sub"), ws.root.join("moved"));
    fs::rename(&sub, &moved)?;
    primitive.rename(&sub, &moved);
    tokio::time::sleep(SETTLE).await;

    assert_eq!(
        keys(&notes),
        vec![moved.join("a.md"), moved.join("deep").join("b.md")]
    );

    fs::remove_dir_all(&moved)?;
    primitive.unlink(&moved);
    tokio::time::sleep(SETTLE).await;

    assert!(notes.snapshot().is_empty());

    notes.close().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn listen_twice_keeps_a_single_subscription() -> Result<()> {
    let ws = Workspace::new()?;
    let primitive = ManualWatchPrimitive::new();
    let notes = ws.notes(&primitive);

    notes.listen().await?;
    notes.listen().await?;
    assert_eq!(primitive.active_roots(), vec![ws.root.clone()]);

    let a = ws.write("a.md", "# A\n")?;
    primitive.add(&a);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(notes.snapshot().len(), 1);

    notes.close().await;
    assert!(primitive.active_roots().is_empty());
    Ok(())
}

#[tokio::test]
async fn listen_on_missing_root_fails() -> Result<()> {
    let ws = Workspace::new()?;
    let missing: &Path = &ws.root.join("missing");
    let notes = Notes::builder(NotesSettings::default().with_root(missing))
        .primitive(Arc::new(NotifyPrimitive::new()))
        .observer(Arc::new(NoopWatchObserver))
        .build();

    assert!(notes.listen().await.is_err());
    assert!(!notes.is_listening().await);
    Ok(())
}

/// Exercises the platform watcher; timing depends on the host.
#[tokio::test]
#[ignore = "depends on host filesystem notification latency"]
async fn notify_primitive_picks_up_new_files() -> Result<()> {
    let ws = Workspace::new()?;
    let notes = Notes::builder(NotesSettings::default().with_root(&ws.root))
        .observer(Arc::new(NoopWatchObserver))
        .build();
    notes.refresh().await?;
    notes.listen().await?;

    ws.write("fresh.md", "# Fresh\n")?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(notes.snapshot().len(), 1);

    notes.close().await;
    Ok(())
}

#[tokio::test]
#[ignore = "depends on host filesystem notification latency"]
async fn notify_primitive_follows_directory_renames() -> Result<()> {
    let ws = Workspace::new()?;
    ws.write("sub/a.md", "# A\n")?;
    let notes = Notes::builder(NotesSettings::default().with_root(&ws.root))
        .observer(Arc::new(NoopWatchObserver))
        .build();
    notes.refresh().await?;
    notes.listen().await?;

    fs::rename(ws.root.join("sub"), ws.root.join("moved"))?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(keys(&notes), vec![ws.root.join("moved").join("a.md")]);

    notes.close().await;
    Ok(())
}
