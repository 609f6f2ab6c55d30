use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    /// A file under the mirror root was written, possibly through a
    /// write-to-temp-then-rename save.
    Saved { local_path: PathBuf },
}

pub fn start_notify_watcher(
    root: &Path,
) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<LocalEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let root = root.to_path_buf();
    let watch_root = root.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for local in map_event(&watch_root, event) {
                let _ = tx.send(local);
            }
        }
        Err(err) => warn!(error = %err, "mirror watcher error"),
    })?;
    watcher.watch(root.as_path(), RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

fn map_event(root: &Path, event: Event) -> Vec<LocalEvent> {
    let paths: Vec<PathBuf> = match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().skip(1).take(1).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths,
        EventKind::Modify(ModifyKind::Name(_) | ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) | EventKind::Create(CreateKind::File | CreateKind::Any) => {
            event.paths
        }
        _ => Vec::new(),
    };
    let mut saved: Vec<LocalEvent> = Vec::new();
    for path in paths {
        if !path.starts_with(root) || path == root {
            continue;
        }
        let event = LocalEvent::Saved { local_path: path };
        if !saved.contains(&event) {
            saved.push(event);
        }
    }
    saved
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        Event {
            kind,
            paths: paths.iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    #[test]
    fn maps_modify_event_to_saved() {
        let root = Path::new("/tmp/mirror");
        let mapped = map_event(
            root,
            event(
                EventKind::Modify(ModifyKind::Data(DataChange::Any)),
                &["/tmp/mirror/www/index.php", "/tmp/mirror/www/index.php"],
            ),
        );
        assert_eq!(
            mapped,
            vec![LocalEvent::Saved {
                local_path: PathBuf::from("/tmp/mirror/www/index.php")
            }]
        );
    }

    #[test]
    fn rename_onto_target_counts_as_save() {
        let root = Path::new("/tmp/mirror");
        let mapped = map_event(
            root,
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/tmp/mirror/.a.txt.swp", "/tmp/mirror/a.txt"],
            ),
        );
        assert_eq!(
            mapped,
            vec![LocalEvent::Saved {
                local_path: PathBuf::from("/tmp/mirror/a.txt")
            }]
        );
    }

    #[test]
    fn ignores_metadata_removals_and_foreign_paths() {
        let root = Path::new("/tmp/mirror");
        let ignored = [
            event(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                &["/tmp/mirror/a.txt"],
            ),
            event(
                EventKind::Remove(RemoveKind::File),
                &["/tmp/mirror/a.txt"],
            ),
            event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/tmp/elsewhere/a.txt"],
            ),
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                &["/tmp/mirror/a.txt"],
            ),
        ];
        for event in ignored {
            assert!(map_event(root, event).is_empty());
        }
    }
}
