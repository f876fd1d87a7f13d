//! Subscriber handles

use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use treewatch_core::{EventInfo, SubscriberId};

/// Monotonic id source shared by every notifier in the process
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Receiving end registered with a notifier
///
/// Clones share the same identity, so stopping any clone stops them all.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    tx: Sender<EventInfo>,
}

impl Subscriber {
    /// Wrap an existing channel sender
    pub fn new(tx: Sender<EventInfo>) -> Self {
        Self {
            id: SubscriberId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            tx,
        }
    }

    /// Identity used in watch points
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn sender(&self) -> &Sender<EventInfo> {
        &self.tx
    }
}

/// Create a subscriber backed by a bounded channel
///
/// Events that arrive while the channel is full are dropped for this
/// subscriber.
pub fn bounded(capacity: usize) -> (Subscriber, Receiver<EventInfo>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (Subscriber::new(tx), rx)
}

/// Create a subscriber backed by an unbounded channel
pub fn unbounded() -> (Subscriber, Receiver<EventInfo>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (Subscriber::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_shared_by_clones() {
        let (a, _rx_a) = bounded(1);
        let (b, _rx_b) = unbounded();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }
}
