//! Records of watches registered with the native backend

use crate::event::Event;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// What the native backend currently watches at a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeWatch {
    /// Non-recursive watch of the node itself
    Direct(Event),
    /// Recursive watch rooted at the node
    Recursive {
        /// Union of every registration in the subtree (visible bits only)
        events: Event,
        /// Per-directory watches when recursion is emulated, `None` when the
        /// backend watches the subtree natively
        emulated: Option<BTreeSet<PathBuf>>,
    },
}

impl NativeWatch {
    /// Mask the watch was registered with
    pub fn events(&self) -> Event {
        match self {
            NativeWatch::Direct(events) => *events,
            NativeWatch::Recursive { events, .. } => *events,
        }
    }

    /// Check if the watch covers the subtree
    pub fn is_recursive(&self) -> bool {
        matches!(self, NativeWatch::Recursive { .. })
    }

    /// Directories watched one by one on behalf of an emulated recursive watch
    pub fn emulated(&self) -> Option<&BTreeSet<PathBuf>> {
        match self {
            NativeWatch::Recursive { emulated, .. } => emulated.as_ref(),
            NativeWatch::Direct(_) => None,
        }
    }

    /// Mutable access to the emulated directory set
    pub fn emulated_mut(&mut self) -> Option<&mut BTreeSet<PathBuf>> {
        match self {
            NativeWatch::Recursive { emulated, .. } => emulated.as_mut(),
            NativeWatch::Direct(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let direct = NativeWatch::Direct(Event::WRITE);
        assert_eq!(direct.events(), Event::WRITE);
        assert!(!direct.is_recursive());
        assert!(direct.emulated().is_none());

        let mut rec = NativeWatch::Recursive {
            events: Event::CREATE,
            emulated: Some(BTreeSet::new()),
        };
        assert!(rec.is_recursive());
        rec.emulated_mut().unwrap().insert(PathBuf::from("/a"));
        assert_eq!(rec.emulated().unwrap().len(), 1);
    }
}
