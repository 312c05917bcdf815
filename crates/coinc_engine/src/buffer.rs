//! Ordered event buffer with coincidence lookup.
//!
//! Uses index-based separation:
//! - one `BTreeMap<timestamp, slab key>` per stream keeps the time order
//! - a shared Slab stores the actual `Event` data
//!
//! Lookups and removals only touch the small index entries; payloads stay
//! put until the event leaves the buffer.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;

use contracts::{Event, StreamType};
use slab::Slab;
use thiserror::Error;

use crate::policy::MatchPolicy;

/// Position of a buffered event
///
/// Only valid until the event it refers to is erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    stream: StreamType,
    timestamp: u64,
    slab_key: usize,
}

impl EventHandle {
    /// Stream of the referenced event
    pub fn stream(&self) -> StreamType {
        self.stream
    }

    /// Timestamp of the referenced event
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Buffer insertion errors; the rejected event is handed back
#[derive(Debug, Error)]
pub enum BufferError {
    /// Same stream already holds an event with this timestamp
    #[error("duplicate {} event at timestamp {}", .event.stream, .event.timestamp)]
    DuplicateEvent { event: Box<Event> },

    /// Hard ceiling reached
    #[error("buffer full ({capacity} events), {} event at {} not inserted", .event.stream, .event.timestamp)]
    CapacityExceeded { event: Box<Event>, capacity: usize },
}

impl BufferError {
    /// Take back the event that could not be inserted
    pub fn into_event(self) -> Event {
        match self {
            BufferError::DuplicateEvent { event } | BufferError::CapacityExceeded { event, .. } => {
                *event
            }
        }
    }
}

/// Time-ordered store of unmatched events
pub struct OrderedEventBuffer {
    policy: MatchPolicy,
    /// Per-stream time index (timestamp -> slab key), indexed by `StreamType::index`
    index: [BTreeMap<u64, usize>; 2],
    /// Actual event storage
    storage: Slab<Event>,
    capacity: usize,
}

impl fmt::Debug for OrderedEventBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedEventBuffer")
            .field("len", &self.storage.len())
            .field("gamma", &self.index[0].len())
            .field("heavy_ion", &self.index[1].len())
            .field("capacity", &self.capacity)
            .field("window", &self.policy.window())
            .finish()
    }
}

impl OrderedEventBuffer {
    /// Create an empty buffer holding at most `capacity` events
    pub fn new(policy: MatchPolicy, capacity: usize) -> Self {
        Self {
            policy,
            index: [BTreeMap::new(), BTreeMap::new()],
            storage: Slab::new(),
            capacity,
        }
    }

    /// Match policy used for lookups
    #[inline]
    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Total buffered events
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Buffered events of one stream
    #[inline]
    pub fn len_of(&self, stream: StreamType) -> usize {
        self.index[stream.index()].len()
    }

    /// Hard ceiling
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.storage.len() >= self.capacity
    }

    /// Whether the stream already holds an event at this timestamp
    #[inline]
    pub fn contains(&self, stream: StreamType, timestamp: u64) -> bool {
        self.index[stream.index()].contains_key(&timestamp)
    }

    /// Insert an event in time order
    ///
    /// Duplicates are reported before the capacity check, so a full buffer
    /// still distinguishes them.
    pub fn insert(&mut self, event: Event) -> Result<EventHandle, BufferError> {
        if self.contains(event.stream, event.timestamp) {
            return Err(BufferError::DuplicateEvent {
                event: Box::new(event),
            });
        }
        if self.is_full() {
            return Err(BufferError::CapacityExceeded {
                event: Box::new(event),
                capacity: self.capacity,
            });
        }

        let stream = event.stream;
        let timestamp = event.timestamp;
        let slab_key = self.storage.insert(event);
        self.index[stream.index()].insert(timestamp, slab_key);

        Ok(EventHandle {
            stream,
            timestamp,
            slab_key,
        })
    }

    /// Find the buffered event of the opposite stream that matches `event`
    ///
    /// Only the nearest neighbour on each side can be in the window; the
    /// closer one wins and ties go to the earlier timestamp.
    pub fn find_equivalent(&self, event: &Event) -> Option<EventHandle> {
        let stream = event.stream.opposite();
        let opposite = &self.index[stream.index()];
        let t = event.timestamp;

        let before = opposite.range(..=t).next_back();
        let after = opposite.range(t..).next();

        [before, after]
            .into_iter()
            .flatten()
            .filter(|(ts, _)| self.policy.within_window(**ts, t))
            .min_by_key(|(ts, _)| (ts.abs_diff(t), **ts))
            .map(|(ts, key)| EventHandle {
                stream,
                timestamp: *ts,
                slab_key: *key,
            })
    }

    /// Borrow a buffered event
    pub fn get(&self, handle: EventHandle) -> Option<&Event> {
        let key = self.index[handle.stream.index()].get(&handle.timestamp)?;
        if *key != handle.slab_key {
            return None;
        }
        self.storage.get(*key)
    }

    /// Remove a buffered event
    ///
    /// Stale handles return `None` and leave the buffer untouched.
    pub fn erase(&mut self, handle: EventHandle) -> Option<Event> {
        let index = &mut self.index[handle.stream.index()];
        match index.get(&handle.timestamp) {
            Some(key) if *key == handle.slab_key => {}
            _ => return None,
        }
        index.remove(&handle.timestamp);
        Some(self.storage.remove(handle.slab_key))
    }

    /// Handle of the earliest event; on equal timestamps gamma comes first
    pub fn earliest(&self) -> Option<EventHandle> {
        let gamma = self.first_of(StreamType::Gamma);
        let heavy_ion = self.first_of(StreamType::HeavyIon);
        match (gamma, heavy_ion) {
            (Some(g), Some(h)) => Some(if h.timestamp < g.timestamp { h } else { g }),
            (g, h) => g.or(h),
        }
    }

    /// Handle of the latest event; on equal timestamps heavy-ion comes last
    pub fn latest(&self) -> Option<EventHandle> {
        let gamma = self.last_of(StreamType::Gamma);
        let heavy_ion = self.last_of(StreamType::HeavyIon);
        match (gamma, heavy_ion) {
            (Some(g), Some(h)) => Some(if g.timestamp > h.timestamp { g } else { h }),
            (g, h) => g.or(h),
        }
    }

    /// Ticks between the earliest and latest buffered event (0 if < 2 events)
    pub fn span(&self) -> u64 {
        match (self.earliest(), self.latest()) {
            (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp),
            _ => 0,
        }
    }

    /// Remove and return the earliest event
    pub fn pop_earliest(&mut self) -> Option<Event> {
        let handle = self.earliest()?;
        self.erase(handle)
    }

    /// Drop every buffered event, returning how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.storage.len();
        self.index.iter_mut().for_each(BTreeMap::clear);
        self.storage.clear();
        removed
    }

    /// Iterate over all buffered events in time order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            gamma: self.index[StreamType::Gamma.index()].iter().peekable(),
            heavy_ion: self.index[StreamType::HeavyIon.index()].iter().peekable(),
            storage: &self.storage,
        }
    }

    fn first_of(&self, stream: StreamType) -> Option<EventHandle> {
        self.index[stream.index()]
            .first_key_value()
            .map(|(ts, key)| EventHandle {
                stream,
                timestamp: *ts,
                slab_key: *key,
            })
    }

    fn last_of(&self, stream: StreamType) -> Option<EventHandle> {
        self.index[stream.index()]
            .last_key_value()
            .map(|(ts, key)| EventHandle {
                stream,
                timestamp: *ts,
                slab_key: *key,
            })
    }
}

/// Time-ordered iterator over buffered events
pub struct Iter<'a> {
    gamma: Peekable<btree_map::Iter<'a, u64, usize>>,
    heavy_ion: Peekable<btree_map::Iter<'a, u64, usize>>,
    storage: &'a Slab<Event>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        let take_gamma = match (self.gamma.peek(), self.heavy_ion.peek()) {
            (Some((g, _)), Some((h, _))) => g <= h,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };

        let (_, key) = if take_gamma {
            self.gamma.next()?
        } else {
            self.heavy_ion.next()?
        };
        self.storage.get(*key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn make_event(stream: StreamType, timestamp: u64) -> Event {
        Event::new(stream, timestamp, 0, Bytes::new())
    }

    fn make_buffer() -> OrderedEventBuffer {
        OrderedEventBuffer::new(MatchPolicy::new(10), 100)
    }

    #[test]
    fn test_iter_is_time_ordered_across_streams() {
        let mut buffer = make_buffer();
        buffer.insert(make_event(StreamType::Gamma, 300)).unwrap();
        buffer.insert(make_event(StreamType::HeavyIon, 100)).unwrap();
        buffer.insert(make_event(StreamType::Gamma, 200)).unwrap();
        buffer.insert(make_event(StreamType::HeavyIon, 400)).unwrap();

        let order: Vec<u64> = buffer.iter().map(|e| e.timestamp).collect();
        assert_eq!(order, vec![100, 200, 300, 400]);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.len_of(StreamType::Gamma), 2);
        assert_eq!(buffer.span(), 300);
    }

    #[test]
    fn test_duplicate_rejected_and_returned() {
        let mut buffer = make_buffer();
        buffer.insert(make_event(StreamType::Gamma, 100)).unwrap();

        let err = buffer
            .insert(make_event(StreamType::Gamma, 100))
            .unwrap_err();
        assert!(matches!(err, BufferError::DuplicateEvent { .. }));
        assert_eq!(err.into_event().timestamp, 100);
        assert_eq!(buffer.len(), 1);

        // Same timestamp on the other stream is not a duplicate
        buffer.insert(make_event(StreamType::HeavyIon, 100)).unwrap();
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_capacity_ceiling() {
        let mut buffer = OrderedEventBuffer::new(MatchPolicy::new(10), 2);
        buffer.insert(make_event(StreamType::Gamma, 1)).unwrap();
        buffer.insert(make_event(StreamType::Gamma, 2)).unwrap();
        assert!(buffer.is_full());

        let err = buffer.insert(make_event(StreamType::Gamma, 3)).unwrap_err();
        assert!(matches!(
            err,
            BufferError::CapacityExceeded { capacity: 2, .. }
        ));

        // Duplicate still reported as such when full
        let err = buffer.insert(make_event(StreamType::Gamma, 2)).unwrap_err();
        assert!(matches!(err, BufferError::DuplicateEvent { .. }));
    }

    #[test]
    fn test_find_equivalent_prefers_closest() {
        let mut buffer = make_buffer();
        buffer.insert(make_event(StreamType::HeavyIon, 92)).unwrap();
        buffer.insert(make_event(StreamType::HeavyIon, 103)).unwrap();

        let query = make_event(StreamType::Gamma, 100);
        let handle = buffer.find_equivalent(&query).unwrap();
        assert_eq!(handle.timestamp(), 103);
        assert_eq!(handle.stream(), StreamType::HeavyIon);
    }

    #[test]
    fn test_find_equivalent_tie_goes_to_earlier() {
        let mut buffer = make_buffer();
        buffer.insert(make_event(StreamType::HeavyIon, 95)).unwrap();
        buffer.insert(make_event(StreamType::HeavyIon, 105)).unwrap();

        let query = make_event(StreamType::Gamma, 100);
        assert_eq!(buffer.find_equivalent(&query).unwrap().timestamp(), 95);
    }

    #[test]
    fn test_find_equivalent_ignores_same_stream_and_window_edge() {
        let mut buffer = make_buffer();
        buffer.insert(make_event(StreamType::Gamma, 101)).unwrap();
        buffer.insert(make_event(StreamType::HeavyIon, 110)).unwrap();

        let query = make_event(StreamType::Gamma, 100);
        assert!(buffer.find_equivalent(&query).is_none());

        let query = make_event(StreamType::Gamma, 101);
        assert_eq!(buffer.find_equivalent(&query).unwrap().timestamp(), 110);
    }

    #[test]
    fn test_erase_and_stale_handle() {
        let mut buffer = make_buffer();
        let handle = buffer.insert(make_event(StreamType::Gamma, 50)).unwrap();

        assert_eq!(buffer.get(handle).unwrap().timestamp, 50);
        assert_eq!(buffer.erase(handle).unwrap().timestamp, 50);
        assert!(buffer.erase(handle).is_none());
        assert!(buffer.get(handle).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_earliest_and_pop_order() {
        let mut buffer = make_buffer();
        buffer.insert(make_event(StreamType::HeavyIon, 100)).unwrap();
        buffer.insert(make_event(StreamType::Gamma, 100)).unwrap();
        buffer.insert(make_event(StreamType::Gamma, 40)).unwrap();

        assert_eq!(buffer.earliest().unwrap().timestamp(), 40);
        assert_eq!(buffer.pop_earliest().unwrap().timestamp, 40);

        // Equal timestamps: gamma first
        let next = buffer.pop_earliest().unwrap();
        assert_eq!(next.stream, StreamType::Gamma);
        let last = buffer.pop_earliest().unwrap();
        assert_eq!(last.stream, StreamType::HeavyIon);
        assert!(buffer.pop_earliest().is_none());
        assert_eq!(buffer.span(), 0);
    }

    #[test]
    fn test_clear() {
        let mut buffer = make_buffer();
        buffer.insert(make_event(StreamType::Gamma, 1)).unwrap();
        buffer.insert(make_event(StreamType::HeavyIon, 500)).unwrap();

        assert_eq!(buffer.clear(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.earliest().is_none());
    }
}
