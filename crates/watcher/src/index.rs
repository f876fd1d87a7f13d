//! Reverse index from subscriber to the paths it is registered at

use crate::subscriber::Subscriber;
use ahash::AHashMap;
use crossbeam_channel::Sender;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use treewatch_core::{EventInfo, SubscriberId};

struct Registration {
    tx: Sender<EventInfo>,
    paths: BTreeSet<PathBuf>,
}

/// Channel index used by `stop` to avoid a full tree walk
#[derive(Default)]
pub(crate) struct ChannelIndex {
    entries: AHashMap<SubscriberId, Registration>,
}

impl ChannelIndex {
    /// Record that `subscriber` is registered at `path`
    pub(crate) fn insert(&mut self, subscriber: &Subscriber, path: &Path) {
        self.entries
            .entry(subscriber.id())
            .or_insert_with(|| Registration {
                tx: subscriber.sender().clone(),
                paths: BTreeSet::new(),
            })
            .paths
            .insert(path.to_path_buf());
    }

    /// Forget `id`, returning every path it was registered at
    pub(crate) fn remove(&mut self, id: SubscriberId) -> Option<BTreeSet<PathBuf>> {
        self.entries.remove(&id).map(|r| r.paths)
    }

    /// Channel of `id`
    pub(crate) fn sender(&self, id: SubscriberId) -> Option<&Sender<EventInfo>> {
        self.entries.get(&id).map(|r| &r.tx)
    }

    /// Paths `id` is registered at
    pub(crate) fn paths(&self, id: SubscriberId) -> Option<&BTreeSet<PathBuf>> {
        self.entries.get(&id).map(|r| &r.paths)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
