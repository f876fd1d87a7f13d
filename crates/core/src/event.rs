//! Portable event vocabulary and set algebra

use bitflags::bitflags;
use std::fmt;
use std::path::{Path, PathBuf};

bitflags! {
    /// Set of filesystem events
    ///
    /// The four low bits are reported to subscribers. `RECURSIVE` and
    /// `INTERNAL` are bookkeeping bits: they appear in watch point masks but
    /// never in an [`EventInfo`] handed to a subscriber.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Event: u32 {
        /// Entry created (or moved in)
        const CREATE = 0b0000_0001;
        /// Entry deleted
        const DELETE = 0b0000_0010;
        /// File contents written
        const WRITE = 0b0000_0100;
        /// Entry renamed (or moved out)
        const RENAME = 0b0000_1000;

        /// The watch covers the whole subtree
        const RECURSIVE = 0b0001_0000_0000;
        /// Bits were added only to auto-discover directories under an
        /// emulated recursive watch
        const INTERNAL = 0b0010_0000_0000;
    }
}

impl Event {
    /// Every event a subscriber can ask for
    pub const VISIBLE: Event = Event::CREATE
        .union(Event::DELETE)
        .union(Event::WRITE)
        .union(Event::RENAME);

    /// Strip the bookkeeping bits
    pub fn visible(self) -> Event {
        self & Self::VISIBLE
    }

    /// Whether the recursive marker is set
    pub fn is_recursive(self) -> bool {
        self.contains(Self::RECURSIVE)
    }

    /// Mask that must be registered for an emulated recursive watch
    ///
    /// Every directory needs `CREATE` so new subdirectories are seen. When no
    /// subscriber asked for it, the bit is tagged `INTERNAL`.
    pub fn with_discovery(self) -> Event {
        if self.contains(Self::CREATE) {
            self
        } else {
            self | Self::CREATE | Self::INTERNAL
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::empty()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

/// How a node's aggregate mask changed after one add/remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDiff {
    /// Aggregate before the change
    pub old: Event,
    /// Aggregate after the change
    pub new: Event,
}

impl EventDiff {
    /// The "nothing changed" diff
    pub const NONE: EventDiff = EventDiff {
        old: Event::empty(),
        new: Event::empty(),
    };

    /// Create a diff, collapsing equal masks to [`EventDiff::NONE`]
    ///
    /// `INTERNAL` is stripped from both sides.
    pub fn new(old: Event, new: Event) -> Self {
        if old == new {
            return Self::NONE;
        }
        Self {
            old: old - Event::INTERNAL,
            new: new - Event::INTERNAL,
        }
    }

    /// Check if the diff describes no change
    pub fn is_none(&self) -> bool {
        self.old == self.new
    }
}

/// Event delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    path: PathBuf,
    event: Event,
}

impl EventInfo {
    /// Create an event for `path`; bookkeeping bits are dropped
    pub fn new(path: impl Into<PathBuf>, event: Event) -> Self {
        Self {
            path: path.into(),
            event: event.visible(),
        }
    }

    /// Path the event happened at
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The event itself
    pub fn event(&self) -> Event {
        self.event
    }
}

/// Event as produced by a native backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Absolute path of the affected entry
    pub path: PathBuf,
    /// What happened
    pub event: Event,
    /// Whether the affected entry is (or was) a directory, if the backend knows
    pub is_dir: bool,
}

impl RawEvent {
    /// Create a raw event for a non-directory entry
    pub fn new(path: impl Into<PathBuf>, event: Event) -> Self {
        Self {
            path: path.into(),
            event,
            is_dir: false,
        }
    }

    /// Create a raw event for a directory entry
    pub fn dir(path: impl Into<PathBuf>, event: Event) -> Self {
        Self {
            path: path.into(),
            event,
            is_dir: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_strips_bookkeeping() {
        let e = Event::CREATE | Event::RECURSIVE | Event::INTERNAL;
        assert_eq!(e.visible(), Event::CREATE);
        assert!(e.is_recursive());
        assert!(!e.visible().is_recursive());
    }

    #[test]
    fn test_with_discovery() {
        assert_eq!(Event::CREATE.with_discovery(), Event::CREATE);
        assert_eq!(
            Event::WRITE.with_discovery(),
            Event::WRITE | Event::CREATE | Event::INTERNAL
        );
        assert_eq!(Event::WRITE.with_discovery().visible(), Event::WRITE | Event::CREATE);
    }

    #[test]
    fn test_diff_none_when_equal() {
        assert!(EventDiff::new(Event::CREATE, Event::CREATE).is_none());
        assert_eq!(EventDiff::new(Event::WRITE, Event::WRITE), EventDiff::NONE);
    }

    #[test]
    fn test_diff_strips_internal() {
        let diff = EventDiff::new(Event::WRITE, Event::WRITE | Event::CREATE | Event::INTERNAL);
        assert_eq!(diff.old, Event::WRITE);
        assert_eq!(diff.new, Event::WRITE | Event::CREATE);
    }

    #[test]
    fn test_event_info_never_carries_bookkeeping() {
        let info = EventInfo::new("/a", Event::DELETE | Event::RECURSIVE);
        assert_eq!(info.event(), Event::DELETE);
        assert_eq!(info.path(), Path::new("/a"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Event::empty().to_string(), "NONE");
        assert_eq!((Event::CREATE | Event::RENAME).to_string(), "CREATE|RENAME");
    }
}
