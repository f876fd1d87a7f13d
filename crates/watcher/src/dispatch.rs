//! Event routing
//!
//! A raw event at `parent/base` reaches:
//! - recursive subscribers at `parent` and every ancestor of it
//! - direct subscribers at `parent`
//! - direct subscribers at the path itself
//!
//! Each subscriber receives an event at most once, however many of its
//! registrations match.

use crate::native::Native;
use crate::notifier::State;
use crossbeam_channel::{Sender, TrySendError};
use smallvec::SmallVec;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use treewatch_core::{Error, Event, EventInfo, NativeWatch, RawEvent, SubscriberId, Tree, Walk};

/// A resolved delivery, made after the state lock is released
pub(crate) type Delivery = (Sender<EventInfo>, EventInfo);

/// Resolve who receives `raw`
pub(crate) fn route(state: &State, raw: &RawEvent) -> Vec<Delivery> {
    let event = raw.event.visible();
    if event.is_empty() {
        return Vec::new();
    }

    let mut matched: SmallVec<[SubscriberId; 8]> = SmallVec::new();
    if let Some(parent) = raw.path.parent() {
        let walked = state.tree.walk_path::<Error, _>(parent, |node, _, _| {
            extend(&mut matched, node.watchpoint().dispatch(event, true));
            Ok(Walk::Continue)
        });
        if let Err(err) = walked {
            trace!("Dropping {} {}: {}", event, raw.path.display(), err);
            return Vec::new();
        }
        if let Ok(node) = state.tree.get(parent) {
            extend(&mut matched, node.watchpoint().dispatch(event, false));
        }
    }
    if let Ok(node) = state.tree.get(&raw.path) {
        extend(&mut matched, node.watchpoint().dispatch(event, false));
    }

    matched
        .into_iter()
        .filter_map(|id| state.index.sender(id))
        .map(|tx| (tx.clone(), EventInfo::new(raw.path.clone(), event)))
        .collect()
}

/// Hand events to subscribers without blocking
///
/// A full channel loses the event for that subscriber only.
pub(crate) fn deliver(deliveries: Vec<Delivery>) {
    for (tx, info) in deliveries {
        match tx.try_send(info) {
            Ok(()) => {}
            Err(TrySendError::Full(info)) => {
                trace!("Dropping {} {}: subscriber queue full", info.event(), info.path().display());
            }
            Err(TrySendError::Disconnected(info)) => {
                trace!("Dropping {} {}: subscriber gone", info.event(), info.path().display());
            }
        }
    }
}

/// Check if `raw` can change the directory set of an emulated root
pub(crate) fn affects_emulation(raw: &RawEvent) -> bool {
    (raw.is_dir && raw.event.contains(Event::CREATE)) || raw.event.intersects(Event::DELETE | Event::RENAME)
}

/// Keep emulated recursive roots in step with directories coming and going
pub(crate) fn track(state: &mut State, native: &Native, raw: &RawEvent) {
    let Some((root, events)) = emulated_root(&state.tree, &raw.path) else {
        return;
    };
    let Some(dirs) = state
        .tree
        .get_mut(&root)
        .ok()
        .and_then(|node| node.native_mut())
        .and_then(NativeWatch::emulated_mut)
    else {
        return;
    };

    if raw.is_dir && raw.event.contains(Event::CREATE) {
        if dirs.contains(&raw.path) {
            return;
        }
        let found = native.discover(&raw.path, events);
        debug!("Discovered {} directories under {}", found.len(), raw.path.display());
        dirs.extend(found);
        return;
    }

    let gone: Vec<PathBuf> = dirs.iter().filter(|dir| dir.starts_with(&raw.path)).cloned().collect();
    for dir in &gone {
        dirs.remove(dir);
        if raw.event.contains(Event::RENAME) {
            native.forget(dir);
        }
    }
    if !gone.is_empty() {
        debug!("Released {} directories under {}", gone.len(), raw.path.display());
    }
}

/// Emulated recursive root covering `path`, with its mask
fn emulated_root(tree: &Tree, path: &Path) -> Option<(PathBuf, Event)> {
    let mut found = None;
    let _ = tree.walk_path::<Error, _>(path, |node, node_path, _| match node.native() {
        Some(native) if native.emulated().is_some() => {
            found = Some((node_path.to_path_buf(), native.events()));
            Ok(Walk::Skip)
        }
        _ => Ok(Walk::Continue),
    });
    found
}

fn extend(matched: &mut SmallVec<[SubscriberId; 8]>, ids: SmallVec<[SubscriberId; 4]>) {
    for id in ids {
        if !matched.contains(&id) {
            matched.push(id);
        }
    }
}
