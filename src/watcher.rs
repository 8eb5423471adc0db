//! Change observer for the workspace tree.
//!
//! Watches the workspace root recursively and forwards normalized
//! create/modify/delete events into the ingestion channel. The callback
//! runs on notify's own thread and does no classification or I/O beyond
//! a directory check.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::entity::ChangeType;
use crate::processor::{is_ignored, ChangeEvent};
use crate::state::AppState;

/// Start watching the workspace root.
///
/// Returns the watcher handle; dropping it stops the watch. Events are
/// forwarded with `blocking_send`, so a full ingestion queue slows the
/// watcher down instead of dropping events.
pub fn start_watcher(
    state: Arc<AppState>,
    events: mpsc::Sender<ChangeEvent>,
) -> Result<RecommendedWatcher, String> {
    let root = state.workspace_root.clone();
    let callback_root = root.clone();

    let mut watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| match result {
            Ok(event) => {
                for change in normalize(&event, &callback_root) {
                    if events.blocking_send(change).is_err() {
                        log::debug!("Watcher: ingestion channel closed");
                        return;
                    }
                }
            }
            Err(e) => log::warn!("Watcher: notify error: {}", e),
        },
        notify::Config::default(),
    )
    .map_err(|e| format!("Failed to create filesystem watcher: {}", e))?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| format!("Failed to watch {}: {}", root.display(), e))?;

    log::info!("Watcher: watching {} for changes", root.display());
    Ok(watcher)
}

/// Map one notify event onto zero or more change events.
pub fn normalize(event: &Event, root: &Path) -> Vec<ChangeEvent> {
    let relevant = |p: &PathBuf| {
        p.strip_prefix(root)
            .map(|rel| !rel.as_os_str().is_empty() && !is_ignored(rel))
            .unwrap_or(false)
    };
    let created = |p: &PathBuf| {
        if p.is_dir() {
            ChangeType::DirectoryCreated
        } else {
            ChangeType::FileCreated
        }
    };

    let mut changes: Vec<(PathBuf, ChangeType)> = Vec::new();
    match &event.kind {
        EventKind::Create(CreateKind::Folder) => {
            changes.extend(event.paths.iter().map(|p| (p.clone(), ChangeType::DirectoryCreated)));
        }
        EventKind::Create(_) => {
            changes.extend(event.paths.iter().map(|p| (p.clone(), created(p))));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            changes.extend(event.paths.iter().map(|p| (p.clone(), ChangeType::FileDeleted)));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            changes.extend(event.paths.iter().map(|p| (p.clone(), created(p))));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = event.paths.as_slice() {
                changes.push((from.clone(), ChangeType::FileDeleted));
                changes.push((to.clone(), created(to)));
            }
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(_) => {
            changes.extend(
                event
                    .paths
                    .iter()
                    .filter(|p| p.is_file())
                    .map(|p| (p.clone(), ChangeType::FileModified)),
            );
        }
        // Directory removal has no change type of its own; its files report individually
        EventKind::Remove(RemoveKind::Folder) => {}
        EventKind::Remove(_) => {
            changes.extend(event.paths.iter().map(|p| (p.clone(), ChangeType::FileDeleted)));
        }
        _ => {}
    }

    changes
        .into_iter()
        .filter(|(p, _)| relevant(p))
        .map(|(path, change_type)| ChangeEvent::new(path, change_type))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::DataChange;
    use std::fs;

    fn kinds(changes: &[ChangeEvent]) -> Vec<ChangeType> {
        changes.iter().map(|c| c.change_type).collect()
    }

    #[test]
    fn test_create_distinguishes_directories() {
        let ws = tempfile::tempdir().unwrap();
        let dir = ws.path().join("vp-1on1-weekly");
        fs::create_dir(&dir).unwrap();
        let file = ws.path().join("notes.md");
        fs::write(&file, "x").unwrap();

        let event = Event::new(EventKind::Create(CreateKind::Any))
            .add_path(dir)
            .add_path(file);
        assert_eq!(
            kinds(&normalize(&event, ws.path())),
            vec![ChangeType::DirectoryCreated, ChangeType::FileCreated]
        );
    }

    #[test]
    fn test_rename_becomes_delete_then_create() {
        let ws = tempfile::tempdir().unwrap();
        let to = ws.path().join("b.md");
        fs::write(&to, "x").unwrap();
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(ws.path().join("a.md"))
            .add_path(to);
        assert_eq!(
            kinds(&normalize(&event, ws.path())),
            vec![ChangeType::FileDeleted, ChangeType::FileCreated]
        );
    }

    #[test]
    fn test_skips_hidden_metadata_and_outside_paths() {
        let ws = tempfile::tempdir().unwrap();
        let hidden = ws.path().join(".git").join("index");
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any))).add_path(hidden);
        assert!(normalize(&event, ws.path()).is_empty());

        let file = ws.path().join("notes.md");
        fs::write(&file, "x").unwrap();
        let meta = Event::new(EventKind::Modify(ModifyKind::Metadata(
            notify::event::MetadataKind::Any,
        )))
        .add_path(file.clone());
        assert!(normalize(&meta, ws.path()).is_empty());

        let data = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(file);
        assert_eq!(kinds(&normalize(&data, ws.path())), vec![ChangeType::FileModified]);

        let outside = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/elsewhere/x.md"));
        assert!(normalize(&outside, ws.path()).is_empty());
    }
}
