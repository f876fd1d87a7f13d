//! Recursive-watch planning
//!
//! The layout of native watches is a pure function of the watch-point totals:
//!
//! - a node whose total carries `RECURSIVE`, with no such ancestor, is a
//!   recursive root watched with the union of every visible mask below it
//! - nodes under a recursive root are folded into it and hold nothing
//! - any other node with a non-empty total gets a direct watch
//!
//! Planning diffs that desired layout against the recorded native watches
//! inside a region and emits the calls that turn one into the other.

use crate::native::{NativeOp, Update};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use treewatch_core::{Error, Event, NativeWatch, Tree, Walk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Want {
    Direct(Event),
    Recursive(Event),
}

/// Top of the part of the tree a change at `path` can affect
///
/// This is the topmost node on the way to `path` that is, or is about to
/// become, a recursive root. Without one the region is `path` itself.
pub(crate) fn region(tree: &Tree, path: &Path) -> Result<PathBuf, Error> {
    let mut top: Option<PathBuf> = None;
    tree.walk_path::<Error, _>(path, |node, node_path, _| {
        let recorded = node.native().map_or(false, NativeWatch::is_recursive);
        if recorded || node.watchpoint().total().is_recursive() {
            top = Some(node_path.to_path_buf());
            return Ok(Walk::Skip);
        }
        Ok(Walk::Continue)
    })?;
    Ok(top.unwrap_or_else(|| path.to_path_buf()))
}

/// Native calls that bring the region under `root` to its desired layout
///
/// With `teardown_first`, removals run before new watches are planted. This
/// is required when recursion is emulated, since per-directory watches of an
/// old and a new root overlap. Otherwise new watches go in first, so a path
/// stays covered while the watch it replaces is released. A watch changing
/// kind in place is the exception: it has to be removed before the path can
/// be watched again.
pub(crate) fn reconcile(tree: &Tree, root: &Path, teardown_first: bool) -> Result<Vec<NativeOp>, Error> {
    let desired = desired(tree, root)?;
    let current = current(tree, root)?;

    let mut swaps = Vec::new();
    let mut swapped: Vec<&PathBuf> = Vec::new();
    let mut rewatch = Vec::new();
    let mut fresh: Vec<(PathBuf, Want)> = Vec::new();

    for (path, want) in &desired {
        match (current.get(path), *want) {
            (Some(NativeWatch::Direct(old)), Want::Direct(new)) => {
                if *old != new {
                    rewatch.push(NativeOp::Rewatch {
                        path: path.clone(),
                        old: *old,
                        new,
                    });
                }
            }
            (Some(NativeWatch::Recursive { events, emulated }), Want::Recursive(new)) => {
                if *events != new {
                    rewatch.push(NativeOp::RecursiveRewatch {
                        old_path: path.clone(),
                        new_path: path.clone(),
                        old: *events,
                        new,
                        emulated: emulated.clone(),
                    });
                }
            }
            (Some(native), want) => {
                swaps.push(remove(path, native));
                swapped.push(path);
                fresh.push((path.clone(), want));
            }
            (None, want) => fresh.push((path.clone(), want)),
        }
    }

    let gone: Vec<(&PathBuf, &NativeWatch)> = current
        .iter()
        .filter(|(path, _)| !desired.contains_key(*path))
        .collect();

    let mut ops = Vec::with_capacity(swaps.len() + rewatch.len() + gone.len() + fresh.len());
    if let Some(op) = relocation(&gone, &fresh) {
        ops.extend(swaps);
        ops.extend(rewatch);
        ops.push(op);
        return Ok(ops);
    }

    let teardowns = gone.into_iter().map(|(path, native)| remove(path, native));
    if teardown_first {
        ops.extend(swaps);
        ops.extend(rewatch);
        ops.extend(teardowns);
        ops.extend(fresh.into_iter().map(plant));
    } else {
        let (replacing, planted): (Vec<_>, Vec<_>) =
            fresh.into_iter().partition(|(path, _)| swapped.contains(&path));
        ops.extend(rewatch);
        ops.extend(planted.into_iter().map(plant));
        ops.extend(swaps);
        ops.extend(replacing.into_iter().map(plant));
        ops.extend(teardowns);
    }
    Ok(ops)
}

/// Record the outcome of executed calls in the tree
pub(crate) fn commit(tree: &mut Tree, updates: Vec<Update>) -> Result<(), Error> {
    for (path, native) in updates {
        match native {
            Some(native) => {
                tree.add(&path)?.set_native(Some(native));
            }
            None => {
                if let Ok(node) = tree.get_mut(&path) {
                    node.set_native(None);
                }
                tree.prune(&path)?;
            }
        }
    }
    Ok(())
}

/// A single recursive root that moved up or down its own branch
fn relocation(gone: &[(&PathBuf, &NativeWatch)], fresh: &[(PathBuf, Want)]) -> Option<NativeOp> {
    let ([(old_path, old)], [(new_path, Want::Recursive(new))]) = (gone, fresh) else {
        return None;
    };
    let NativeWatch::Recursive { events, emulated } = old else {
        return None;
    };
    if !old_path.starts_with(new_path) && !new_path.starts_with(old_path.as_path()) {
        return None;
    }
    Some(NativeOp::RecursiveRewatch {
        old_path: (*old_path).clone(),
        new_path: new_path.clone(),
        old: *events,
        new: *new,
        emulated: emulated.clone(),
    })
}

fn plant((path, want): (PathBuf, Want)) -> NativeOp {
    match want {
        Want::Direct(events) => NativeOp::Watch { path, events },
        Want::Recursive(events) => NativeOp::RecursiveWatch { path, events },
    }
}

fn remove(path: &Path, native: &NativeWatch) -> NativeOp {
    match native {
        NativeWatch::Direct(events) => NativeOp::Unwatch {
            path: path.to_path_buf(),
            events: *events,
        },
        NativeWatch::Recursive { events, emulated } => NativeOp::RecursiveUnwatch {
            path: path.to_path_buf(),
            events: *events,
            emulated: emulated.clone(),
        },
    }
}

fn desired(tree: &Tree, root: &Path) -> Result<BTreeMap<PathBuf, Want>, Error> {
    let mut want = BTreeMap::new();
    if !tree.contains(root) {
        return Ok(want);
    }

    tree.walk_subtree::<Error, _>(root, |node, path| {
        let total = node.watchpoint().total();
        if total.is_recursive() {
            want.insert(path.to_path_buf(), Want::Recursive(union_below(tree, path)?));
            return Ok(Walk::Skip);
        }
        if !total.visible().is_empty() {
            want.insert(path.to_path_buf(), Want::Direct(total.visible()));
        }
        Ok(Walk::Continue)
    })?;
    Ok(want)
}

fn current(tree: &Tree, root: &Path) -> Result<BTreeMap<PathBuf, NativeWatch>, Error> {
    let mut have = BTreeMap::new();
    if !tree.contains(root) {
        return Ok(have);
    }

    tree.walk_subtree::<Error, _>(root, |node, path| {
        if let Some(native) = node.native() {
            have.insert(path.to_path_buf(), native.clone());
        }
        Ok(Walk::Continue)
    })?;
    Ok(have)
}

fn union_below(tree: &Tree, root: &Path) -> Result<Event, Error> {
    let mut union = Event::empty();
    tree.walk_subtree::<Error, _>(root, |node, _| {
        union |= node.watchpoint().total().visible();
        Ok(Walk::Continue)
    })?;
    Ok(union)
}
