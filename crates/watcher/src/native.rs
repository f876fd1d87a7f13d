//! Native call execution and recursive-watch emulation
//!
//! Plans are executed in order. If one call fails, the calls already made are
//! undone in reverse so the backend ends up where it started, and nothing is
//! committed to the tree.

use crate::backend::{Backend, BackendError, RecursiveWatcher};
use crate::config::{NotifierConfig, RecursionMode};
use crate::error::{Error, Result};
use smallvec::{smallvec, SmallVec};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use treewatch_core::{Event, NativeWatch};
use walkdir::WalkDir;

/// One call to issue against the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeOp {
    /// Plant a direct watch
    Watch { path: PathBuf, events: Event },
    /// Remove a direct watch registered with `events`
    Unwatch { path: PathBuf, events: Event },
    /// Change the mask of a direct watch
    Rewatch { path: PathBuf, old: Event, new: Event },
    /// Plant a recursive watch
    RecursiveWatch { path: PathBuf, events: Event },
    /// Remove a recursive watch registered with `events`
    RecursiveUnwatch {
        path: PathBuf,
        events: Event,
        emulated: Option<BTreeSet<PathBuf>>,
    },
    /// Move and/or re-mask a recursive watch
    RecursiveRewatch {
        old_path: PathBuf,
        new_path: PathBuf,
        old: Event,
        new: Event,
        emulated: Option<BTreeSet<PathBuf>>,
    },
}

/// New native record for a path, `None` meaning "nothing watched"
pub(crate) type Update = (PathBuf, Option<NativeWatch>);

impl NativeOp {
    /// Name of the operation, as used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            NativeOp::Watch { .. } => "watch",
            NativeOp::Unwatch { .. } => "unwatch",
            NativeOp::Rewatch { .. } => "rewatch",
            NativeOp::RecursiveWatch { .. } => "recursive_watch",
            NativeOp::RecursiveUnwatch { .. } => "recursive_unwatch",
            NativeOp::RecursiveRewatch { .. } => "recursive_rewatch",
        }
    }

    /// Path the operation targets (the new path for a relocation)
    pub fn path(&self) -> &Path {
        match self {
            NativeOp::Watch { path, .. }
            | NativeOp::Unwatch { path, .. }
            | NativeOp::Rewatch { path, .. }
            | NativeOp::RecursiveWatch { path, .. }
            | NativeOp::RecursiveUnwatch { path, .. } => path,
            NativeOp::RecursiveRewatch { new_path, .. } => new_path,
        }
    }

    /// Operation that reverts this one, given the records it produced
    fn inverse(&self, updates: &[Update]) -> NativeOp {
        let produced = |path: &Path| {
            updates
                .iter()
                .find(|(p, _)| p == path)
                .and_then(|(_, native)| native.as_ref())
                .and_then(|native| native.emulated().cloned())
        };

        match self {
            NativeOp::Watch { path, events } => NativeOp::Unwatch {
                path: path.clone(),
                events: *events,
            },
            NativeOp::Unwatch { path, events } => NativeOp::Watch {
                path: path.clone(),
                events: *events,
            },
            NativeOp::Rewatch { path, old, new } => NativeOp::Rewatch {
                path: path.clone(),
                old: *new,
                new: *old,
            },
            NativeOp::RecursiveWatch { path, events } => NativeOp::RecursiveUnwatch {
                path: path.clone(),
                events: *events,
                emulated: produced(path),
            },
            NativeOp::RecursiveUnwatch { path, events, .. } => NativeOp::RecursiveWatch {
                path: path.clone(),
                events: *events,
            },
            NativeOp::RecursiveRewatch {
                old_path,
                new_path,
                old,
                new,
                ..
            } => NativeOp::RecursiveRewatch {
                old_path: new_path.clone(),
                new_path: old_path.clone(),
                old: *new,
                new: *old,
                emulated: produced(new_path),
            },
        }
    }
}

/// Backend adapter: issues native calls, emulating what the backend lacks
pub(crate) struct Native {
    backend: Backend,
    /// Emulate recursion with per-directory watches
    emulate: bool,
    /// Follow symlinked directories while emulating
    follow_symlinks: bool,
}

impl Native {
    pub(crate) fn new(backend: Backend, config: &NotifierConfig) -> Self {
        let emulate = !backend.is_recursive() || config.recursion == RecursionMode::Emulated;
        debug!(
            "native backend {:?}, recursion {}",
            backend,
            if emulate { "emulated" } else { "native" }
        );
        Self {
            backend,
            emulate,
            follow_symlinks: config.follow_symlinks,
        }
    }

    /// Check if recursive watches are emulated
    pub(crate) fn is_emulated(&self) -> bool {
        self.emulate
    }

    /// Execute `ops` in order, undoing the executed prefix on failure
    pub(crate) fn execute(&self, ops: &[NativeOp]) -> Result<Vec<Update>> {
        let mut done: Vec<(&NativeOp, SmallVec<[Update; 2]>)> = Vec::with_capacity(ops.len());

        for op in ops {
            match self.apply(op) {
                Ok(updates) => done.push((op, updates)),
                Err(err) => {
                    for (op, updates) in done.iter().rev() {
                        let inverse = op.inverse(updates);
                        if let Err(undo_err) = self.apply(&inverse) {
                            error!(
                                "Failed to undo {} {}: {} (backend and tree may have diverged)",
                                op.name(),
                                op.path().display(),
                                undo_err
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        Ok(done.into_iter().flat_map(|(_, updates)| updates).collect())
    }

    /// Watch a directory created under an emulated recursive root
    ///
    /// Returns every directory that is now watched.
    pub(crate) fn discover(&self, dir: &Path, events: Event) -> Vec<PathBuf> {
        match self.emulated_watch(dir, events, false) {
            Ok(dirs) => dirs.into_iter().collect(),
            Err(err) => {
                debug!("Skipping vanished directory {}: {}", dir.display(), err);
                Vec::new()
            }
        }
    }

    /// Unwatch a directory that left an emulated recursive root
    pub(crate) fn forget(&self, dir: &Path) {
        if let Err(err) = self.backend.unwatch(dir) {
            debug!("Ignoring unwatch failure for {}: {}", dir.display(), err);
        }
    }

    fn apply(&self, op: &NativeOp) -> Result<SmallVec<[Update; 2]>> {
        debug!("native {} {}", op.name(), op.path().display());
        let fail = |source: BackendError| Error::Backend {
            op: op.name(),
            path: op.path().to_path_buf(),
            source,
        };

        match op {
            NativeOp::Watch { path, events } => {
                self.backend.watch(path, events.visible()).map_err(fail)?;
                Ok(smallvec![(path.clone(), Some(NativeWatch::Direct(*events)))])
            }
            NativeOp::Unwatch { path, .. } => {
                self.backend.unwatch(path).map_err(fail)?;
                Ok(smallvec![(path.clone(), None)])
            }
            NativeOp::Rewatch { path, old, new } => {
                assert_ne!(old, new, "rewatch of {} with equal masks", path.display());
                self.backend
                    .rewatch(path, old.visible(), new.visible())
                    .map_err(fail)?;
                Ok(smallvec![(path.clone(), Some(NativeWatch::Direct(*new)))])
            }
            NativeOp::RecursiveWatch { path, events } => {
                let emulated = match self.native_recursive() {
                    Some(w) => {
                        w.recursive_watch(path, events.visible()).map_err(fail)?;
                        None
                    }
                    None => Some(self.emulated_watch(path, *events, true)?),
                };
                Ok(smallvec![(
                    path.clone(),
                    Some(NativeWatch::Recursive {
                        events: *events,
                        emulated,
                    })
                )])
            }
            NativeOp::RecursiveUnwatch { path, emulated, .. } => {
                match emulated {
                    Some(dirs) => self.emulated_unwatch(path, dirs)?,
                    None => self.require_native(path).recursive_unwatch(path).map_err(fail)?,
                }
                Ok(smallvec![(path.clone(), None)])
            }
            NativeOp::RecursiveRewatch {
                old_path,
                new_path,
                old,
                new,
                emulated,
            } => {
                assert!(
                    old_path != new_path || old != new,
                    "recursive rewatch of {} with equal masks",
                    new_path.display()
                );
                let emulated = match emulated {
                    Some(dirs) => Some(self.emulated_rewatch(old_path, new_path, *old, *new, dirs)?),
                    None => {
                        self.require_native(new_path)
                            .recursive_rewatch(old_path, new_path, old.visible(), new.visible())
                            .map_err(fail)?;
                        None
                    }
                };
                let moved = NativeWatch::Recursive {
                    events: *new,
                    emulated,
                };
                if old_path == new_path {
                    Ok(smallvec![(new_path.clone(), Some(moved))])
                } else {
                    Ok(smallvec![(old_path.clone(), None), (new_path.clone(), Some(moved))])
                }
            }
        }
    }

    fn native_recursive(&self) -> Option<&dyn RecursiveWatcher> {
        match &self.backend {
            Backend::Recursive(w) if !self.emulate => Some(w.as_ref()),
            _ => None,
        }
    }

    fn require_native(&self, path: &Path) -> &dyn RecursiveWatcher {
        match self.native_recursive() {
            Some(w) => w,
            None => panic!(
                "native recursive watch recorded at {} without native support",
                path.display()
            ),
        }
    }

    /// Watch `root` and every directory below it
    ///
    /// A failure on `root` itself (or, with `strict`, on any directory) undoes
    /// what was watched and is returned. Other directories that cannot be
    /// read are skipped.
    fn emulated_watch(&self, root: &Path, events: Event, strict: bool) -> Result<BTreeSet<PathBuf>> {
        let mask = events.with_discovery().visible();
        let mut dirs = BTreeSet::new();

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() > 0 => {
                    debug!("Skipping unreadable entry under {}: {}", root.display(), err);
                    continue;
                }
                Err(err) => {
                    return Err(Error::Backend {
                        op: "recursive_watch",
                        path: root.to_path_buf(),
                        source: BackendError::Io(err.into()),
                    })
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.into_path();
            if let Err(source) = self.backend.watch(&dir, mask) {
                if strict || dir == root {
                    self.unwatch_all(&dirs);
                    return Err(Error::Backend {
                        op: "watch",
                        path: dir,
                        source,
                    });
                }
                debug!("Skipping {}: {}", dir.display(), source);
                continue;
            }
            dirs.insert(dir);
        }

        Ok(dirs)
    }

    /// Unwatch every directory of an emulated root
    ///
    /// Only a failure on the root is reported; directories below it may
    /// already be gone.
    fn emulated_unwatch(&self, root: &Path, dirs: &BTreeSet<PathBuf>) -> Result<()> {
        if dirs.contains(root) {
            self.backend
                .unwatch(root)
                .map_err(|source| Error::Backend {
                    op: "unwatch",
                    path: root.to_path_buf(),
                    source,
                })?;
        }
        for dir in dirs.iter().filter(|d| d.as_path() != root) {
            self.forget(dir);
        }
        Ok(())
    }

    fn emulated_rewatch(
        &self,
        old_path: &Path,
        new_path: &Path,
        old: Event,
        new: Event,
        dirs: &BTreeSet<PathBuf>,
    ) -> Result<BTreeSet<PathBuf>> {
        if old_path != new_path {
            self.emulated_unwatch(old_path, dirs)?;
            return match self.emulated_watch(new_path, new, true) {
                Ok(moved) => Ok(moved),
                Err(err) => {
                    if let Err(restore_err) = self.emulated_watch(old_path, old, true) {
                        error!(
                            "Failed to restore emulated watch at {}: {}",
                            old_path.display(),
                            restore_err
                        );
                    }
                    Err(err)
                }
            };
        }

        let old_mask = old.with_discovery().visible();
        let new_mask = new.with_discovery().visible();
        if old_mask == new_mask {
            return Ok(dirs.clone());
        }

        if dirs.contains(new_path) {
            self.backend
                .rewatch(new_path, old_mask, new_mask)
                .map_err(|source| Error::Backend {
                    op: "rewatch",
                    path: new_path.to_path_buf(),
                    source,
                })?;
        }
        for dir in dirs.iter().filter(|d| d.as_path() != new_path) {
            if let Err(err) = self.backend.rewatch(dir, old_mask, new_mask) {
                debug!("Ignoring rewatch failure for {}: {}", dir.display(), err);
            }
        }
        Ok(dirs.clone())
    }

    fn unwatch_all(&self, dirs: &BTreeSet<PathBuf>) {
        for dir in dirs {
            self.forget(dir);
        }
    }
}
