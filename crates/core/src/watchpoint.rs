//! Per-node subscriber registrations

use crate::event::{Event, EventDiff};
use ahash::AHashMap;
use smallvec::SmallVec;
use std::fmt;

/// Process-unique identity of a subscriber
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Create an id from a raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

/// Collection of (subscriber, event mask) registrations at one node
///
/// `total` is cached and always equals the OR of every entry. An entry is
/// never stored with an empty mask.
#[derive(Debug, Clone, Default)]
pub struct WatchPoint {
    /// Registrations at this node
    entries: AHashMap<SubscriberId, Event>,
    /// OR of all entries
    total: Event,
}

impl WatchPoint {
    /// Create an empty watch point
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate mask of all registrations
    pub fn total(&self) -> Event {
        self.total
    }

    /// Mask registered for `id`, if any
    pub fn get(&self, id: SubscriberId) -> Option<Event> {
        self.entries.get(&id).copied()
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over registrations
    pub fn iter(&self) -> impl Iterator<Item = (SubscriberId, Event)> + '_ {
        self.entries.iter().map(|(&id, &events)| (id, events))
    }

    /// Register `events` for `id`, OR-ing into any existing entry
    ///
    /// # Panics
    /// If `events` is empty.
    pub fn add(&mut self, id: SubscriberId, events: Event) -> EventDiff {
        assert!(!events.is_empty(), "watch point entry for {id:?} with empty mask");

        *self.entries.entry(id).or_insert_with(Event::empty) |= events;

        let old = self.total;
        self.total |= events;
        EventDiff::new(old, self.total)
    }

    /// Remove the entry for `id` entirely
    pub fn del(&mut self, id: SubscriberId) -> EventDiff {
        if self.entries.remove(&id).is_none() {
            return EventDiff::NONE;
        }
        self.recompute()
    }

    /// Remove `events` from the entry for `id`
    ///
    /// The entry disappears when its mask becomes empty.
    pub fn shrink(&mut self, id: SubscriberId, events: Event) -> EventDiff {
        let Some(mask) = self.entries.get_mut(&id) else {
            return EventDiff::NONE;
        };
        mask.remove(events);
        if mask.is_empty() {
            self.entries.remove(&id);
        }
        self.recompute()
    }

    /// Subscribers that should receive `event`
    ///
    /// With `recursive` set the delivery happens because of recursive
    /// coverage, so only recursive registrations match.
    pub fn dispatch(&self, event: Event, recursive: bool) -> SmallVec<[SubscriberId; 4]> {
        let effective = if recursive {
            event | Event::RECURSIVE
        } else {
            event
        };

        if effective.is_empty() || !self.total.contains(effective) {
            return SmallVec::new();
        }

        let mut matched: SmallVec<[SubscriberId; 4]> = self
            .entries
            .iter()
            .filter(|(_, mask)| mask.contains(effective))
            .map(|(&id, _)| id)
            .collect();
        matched.sort_unstable();
        matched
    }

    fn recompute(&mut self) -> EventDiff {
        let old = self.total;
        self.total = self
            .entries
            .values()
            .fold(Event::empty(), |acc, &mask| acc | mask);
        EventDiff::new(old, self.total)
    }
}
