//! `notify::RecommendedWatcher` as a treewatch backend

use crate::backend::{BackendError, RecursiveWatcher, Watcher};
use crossbeam_channel::{Sender, TrySendError};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::path::Path;
use tracing::warn;
use treewatch_core::{Event, RawEvent};

/// Backend over the platform watcher picked by `notify`
///
/// `notify` does not filter by event kind, so masks are only used by the
/// notifier when routing; changing a mask costs no native call.
pub struct NotifyWatcher {
    inner: Mutex<RecommendedWatcher>,
}

impl NotifyWatcher {
    /// Create a watcher forwarding translated events to `events`
    ///
    /// Events that do not fit in the queue are dropped with a warning.
    pub fn new(events: Sender<RawEvent>) -> Result<Self, BackendError> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    warn!("Watcher error: {}", err);
                    return;
                }
            };
            for raw in translate(&event) {
                match events.try_send(raw) {
                    Ok(()) => {}
                    Err(TrySendError::Full(raw)) => {
                        warn!("Event queue full, dropping {} {}", raw.event, raw.path.display());
                    }
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }
        })
        .map_err(BackendError::other)?;

        Ok(Self {
            inner: Mutex::new(watcher),
        })
    }

    fn add(&self, path: &Path, mode: RecursiveMode) -> Result<(), BackendError> {
        self.inner.lock().watch(path, mode).map_err(BackendError::other)
    }

    fn remove(&self, path: &Path) -> Result<(), BackendError> {
        self.inner.lock().unwatch(path).map_err(BackendError::other)
    }
}

impl Watcher for NotifyWatcher {
    fn watch(&self, path: &Path, _events: Event) -> Result<(), BackendError> {
        self.add(path, RecursiveMode::NonRecursive)
    }

    fn unwatch(&self, path: &Path) -> Result<(), BackendError> {
        self.remove(path)
    }

    fn rewatch(&self, _path: &Path, _old: Event, _new: Event) -> Result<(), BackendError> {
        Ok(())
    }
}

impl RecursiveWatcher for NotifyWatcher {
    fn recursive_watch(&self, path: &Path, _events: Event) -> Result<(), BackendError> {
        self.add(path, RecursiveMode::Recursive)
    }

    fn recursive_unwatch(&self, path: &Path) -> Result<(), BackendError> {
        self.remove(path)
    }

    fn recursive_rewatch(
        &self,
        old_path: &Path,
        new_path: &Path,
        _old: Event,
        _new: Event,
    ) -> Result<(), BackendError> {
        if old_path == new_path {
            return Ok(());
        }
        self.remove(old_path)?;
        self.add(new_path, RecursiveMode::Recursive)
    }
}

/// Map a `notify` event onto raw events, one per affected path
fn translate(event: &notify::Event) -> SmallVec<[RawEvent; 2]> {
    let mut out = SmallVec::new();
    let raw = |path: &Path, kind: Event, is_dir: bool| RawEvent {
        path: path.to_path_buf(),
        event: kind,
        is_dir,
    };

    match event.kind {
        EventKind::Create(kind) => {
            for path in &event.paths {
                let is_dir = kind == CreateKind::Folder || path.is_dir();
                out.push(raw(path, Event::CREATE, is_dir));
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in &event.paths {
                out.push(raw(path, Event::RENAME, false));
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in &event.paths {
                out.push(raw(path, Event::CREATE, path.is_dir()));
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = event.paths.as_slice() {
                out.push(raw(from, Event::RENAME, false));
                out.push(raw(to, Event::CREATE, to.is_dir()));
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            for path in &event.paths {
                let kind = if path.exists() { Event::CREATE } else { Event::RENAME };
                out.push(raw(path, kind, path.is_dir()));
            }
        }
        EventKind::Modify(_) => {
            for path in &event.paths {
                out.push(raw(path, Event::WRITE, false));
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                out.push(raw(path, Event::DELETE, false));
            }
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::RemoveKind;
    use std::path::PathBuf;

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut event = notify::Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn test_translate_create_and_remove() {
        let created = translate(&event(EventKind::Create(CreateKind::Folder), &["/nowhere/d"]));
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].event, Event::CREATE);
        assert!(created[0].is_dir);

        let removed = translate(&event(EventKind::Remove(RemoveKind::File), &["/nowhere/f"]));
        assert_eq!(removed[0].event, Event::DELETE);
    }

    #[test]
    fn test_translate_rename_pair() {
        let raws = translate(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/nowhere/old", "/nowhere/new"],
        ));
        assert_eq!(raws.len(), 2);
        assert_eq!(raws[0].path, PathBuf::from("/nowhere/old"));
        assert_eq!(raws[0].event, Event::RENAME);
        assert_eq!(raws[1].path, PathBuf::from("/nowhere/new"));
        assert_eq!(raws[1].event, Event::CREATE);
    }

    #[test]
    fn test_translate_skips_access() {
        let raws = translate(&event(EventKind::Access(notify::event::AccessKind::Any), &["/nowhere/f"]));
        assert!(raws.is_empty());
    }
}
