//! Contract with the native watcher backend
//!
//! A backend must watch and unwatch single paths. Changing a mask in place and
//! recursive watching are optional: `rewatch` falls back to unwatch + watch,
//! and recursion is emulated by the core unless the backend is registered
//! through [`Backend::recursive`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use treewatch_core::Event;

/// Error reported by a native backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// I/O failure (permission denied, resource limits, missing path)
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Asked to remove a watch the backend does not hold
    #[error("no watch registered for {}", .0.display())]
    WatchNotFound(PathBuf),

    /// Any other backend-specific failure
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl BackendError {
    /// Wrap a backend-specific error
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BackendError::Other(Box::new(err))
    }
}

/// Non-recursive native watching
///
/// Paths are always absolute and canonical. Masks never carry bookkeeping
/// bits.
pub trait Watcher: Send + Sync {
    /// Start watching `path` for `events`
    fn watch(&self, path: &Path, events: Event) -> Result<(), BackendError>;

    /// Stop watching `path`
    fn unwatch(&self, path: &Path) -> Result<(), BackendError>;

    /// Change the mask of an existing watch; `old != new` is guaranteed
    fn rewatch(&self, path: &Path, old: Event, new: Event) -> Result<(), BackendError> {
        let _ = old;
        self.unwatch(path)?;
        self.watch(path, new)
    }
}

/// Native recursive watching
pub trait RecursiveWatcher: Watcher {
    /// Watch `path` and everything below it
    fn recursive_watch(&self, path: &Path, events: Event) -> Result<(), BackendError>;

    /// Stop a recursive watch rooted at `path`
    fn recursive_unwatch(&self, path: &Path) -> Result<(), BackendError>;

    /// Move and/or re-mask a recursive watch
    ///
    /// `old_path != new_path` or `old != new` is guaranteed.
    fn recursive_rewatch(
        &self,
        old_path: &Path,
        new_path: &Path,
        old: Event,
        new: Event,
    ) -> Result<(), BackendError> {
        let _ = old;
        self.recursive_unwatch(old_path)?;
        self.recursive_watch(new_path, new)
    }
}

/// Backend together with its capabilities, decided once at construction
#[derive(Clone)]
pub enum Backend {
    /// Only non-recursive watches; recursion is emulated
    Flat(Arc<dyn Watcher>),
    /// Native recursive watches available
    Recursive(Arc<dyn RecursiveWatcher>),
}

impl Backend {
    /// Register a backend without recursive support
    pub fn flat<W: Watcher + 'static>(watcher: Arc<W>) -> Self {
        Backend::Flat(watcher)
    }

    /// Register a backend with native recursive support
    pub fn recursive<W: RecursiveWatcher + 'static>(watcher: Arc<W>) -> Self {
        Backend::Recursive(watcher)
    }

    /// Check if the backend watches subtrees natively
    pub fn is_recursive(&self) -> bool {
        matches!(self, Backend::Recursive(_))
    }

    pub(crate) fn watch(&self, path: &Path, events: Event) -> Result<(), BackendError> {
        match self {
            Backend::Flat(w) => w.watch(path, events),
            Backend::Recursive(w) => w.watch(path, events),
        }
    }

    pub(crate) fn unwatch(&self, path: &Path) -> Result<(), BackendError> {
        match self {
            Backend::Flat(w) => w.unwatch(path),
            Backend::Recursive(w) => w.unwatch(path),
        }
    }

    pub(crate) fn rewatch(&self, path: &Path, old: Event, new: Event) -> Result<(), BackendError> {
        match self {
            Backend::Flat(w) => w.rewatch(path, old, new),
            Backend::Recursive(w) => w.rewatch(path, old, new),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Flat(_) => f.write_str("Backend::Flat"),
            Backend::Recursive(_) => f.write_str("Backend::Recursive"),
        }
    }
}
