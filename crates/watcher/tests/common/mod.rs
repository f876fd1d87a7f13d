//! Shared fixtures for notifier tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use treewatch::{Backend, BackendError, Event, EventInfo, Notifier, NotifierConfig, RecursiveWatcher, Watcher};

/// A native call as seen by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Watch(PathBuf, Event),
    Unwatch(PathBuf),
    Rewatch(PathBuf, Event, Event),
    RecursiveWatch(PathBuf, Event),
    RecursiveUnwatch(PathBuf),
    RecursiveRewatch(PathBuf, PathBuf, Event, Event),
}

impl Call {
    fn op(&self) -> &'static str {
        match self {
            Call::Watch(..) => "watch",
            Call::Unwatch(..) => "unwatch",
            Call::Rewatch(..) => "rewatch",
            Call::RecursiveWatch(..) => "recursive_watch",
            Call::RecursiveUnwatch(..) => "recursive_unwatch",
            Call::RecursiveRewatch(..) => "recursive_rewatch",
        }
    }

    fn path(&self) -> &Path {
        match self {
            Call::Watch(path, _)
            | Call::Unwatch(path)
            | Call::Rewatch(path, ..)
            | Call::RecursiveWatch(path, _)
            | Call::RecursiveUnwatch(path) => path,
            Call::RecursiveRewatch(_, path, ..) => path,
        }
    }
}

/// Backend that records every call and can be told to fail one
#[derive(Default)]
pub struct Spy {
    calls: Mutex<Vec<Call>>,
    fail: Mutex<Option<(&'static str, PathBuf)>>,
}

impl Spy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drain the calls recorded so far
    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Fail the next `op` on `path`
    pub fn fail_once(&self, op: &'static str, path: impl Into<PathBuf>) {
        *self.fail.lock() = Some((op, path.into()));
    }

    fn record(&self, call: Call) -> Result<(), BackendError> {
        let mut fail = self.fail.lock();
        if let Some((op, path)) = fail.as_ref() {
            if *op == call.op() && path == call.path() {
                *fail = None;
                return Err(BackendError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "injected failure",
                )));
            }
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl Watcher for Spy {
    fn watch(&self, path: &Path, events: Event) -> Result<(), BackendError> {
        self.record(Call::Watch(path.to_path_buf(), events))
    }

    fn unwatch(&self, path: &Path) -> Result<(), BackendError> {
        self.record(Call::Unwatch(path.to_path_buf()))
    }

    fn rewatch(&self, path: &Path, old: Event, new: Event) -> Result<(), BackendError> {
        self.record(Call::Rewatch(path.to_path_buf(), old, new))
    }
}

impl RecursiveWatcher for Spy {
    fn recursive_watch(&self, path: &Path, events: Event) -> Result<(), BackendError> {
        self.record(Call::RecursiveWatch(path.to_path_buf(), events))
    }

    fn recursive_unwatch(&self, path: &Path) -> Result<(), BackendError> {
        self.record(Call::RecursiveUnwatch(path.to_path_buf()))
    }

    fn recursive_rewatch(
        &self,
        old_path: &Path,
        new_path: &Path,
        old: Event,
        new: Event,
    ) -> Result<(), BackendError> {
        self.record(Call::RecursiveRewatch(old_path.to_path_buf(), new_path.to_path_buf(), old, new))
    }
}

/// Notifier over a natively recursive spy
pub fn native(spy: &Arc<Spy>) -> Notifier {
    Notifier::new(Backend::recursive(Arc::clone(spy)), &NotifierConfig::default())
}

/// Notifier over a flat spy, so recursion is emulated
pub fn emulated(spy: &Arc<Spy>) -> Notifier {
    Notifier::new(Backend::flat(Arc::clone(spy)), &NotifierConfig::default())
}

/// Temporary directory tree with the given relative directories
///
/// Returns the guard and the canonical root.
pub fn dirs(relative: &[&str]) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    for dir in relative {
        std::fs::create_dir_all(root.join(dir)).unwrap();
    }
    (temp_dir, root)
}

/// Route library logs to the test output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// `path/...`
pub fn rec(path: &Path) -> PathBuf {
    path.join("...")
}

/// Everything currently queued on a subscriber channel
pub fn drain(rx: &crossbeam_channel::Receiver<EventInfo>) -> Vec<EventInfo> {
    rx.try_iter().collect()
}
