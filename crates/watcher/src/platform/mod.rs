//! Native backends built on the `notify` crate

mod notify_watcher;

pub use notify_watcher::NotifyWatcher;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::Arc;
use treewatch_core::RawEvent;

/// Backend for the current platform
///
/// inotify has no subtree watches, so Linux gets a flat backend and the
/// notifier emulates recursion. FSEvents and ReadDirectoryChangesW watch
/// subtrees natively.
pub fn recommended(events: Sender<RawEvent>) -> Result<Backend> {
    let watcher = NotifyWatcher::new(events).map_err(|source| Error::Backend {
        op: "init",
        path: PathBuf::new(),
        source,
    })?;
    if cfg!(any(target_os = "linux", target_os = "android")) {
        Ok(Backend::flat(Arc::new(watcher)))
    } else {
        Ok(Backend::recursive(Arc::new(watcher)))
    }
}
