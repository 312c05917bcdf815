//! Coincidence match policy.
//!
//! A total order over events that doubles as the coincidence test: two
//! events from different streams closer than the window compare `Equal`.

use std::cmp::Ordering;

use contracts::{Event, StreamType};

/// Ordering and equivalence rule for buffered events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    coincidence_window: u64,
}

impl MatchPolicy {
    /// Create a policy with the given window (ticks, strict `<`)
    pub fn new(coincidence_window: u64) -> Self {
        Self { coincidence_window }
    }

    /// Coincidence window in ticks
    #[inline]
    pub fn window(&self) -> u64 {
        self.coincidence_window
    }

    /// Absolute tick distance between two events
    #[inline]
    pub fn time_diff(&self, a: &Event, b: &Event) -> u64 {
        a.time_diff(b)
    }

    /// Whether two timestamps are close enough to match
    #[inline]
    pub fn within_window(&self, a: u64, b: u64) -> bool {
        a.abs_diff(b) < self.coincidence_window
    }

    /// Whether an event of `a_stream` at `a` matches one of `b_stream` at `b`
    #[inline]
    pub fn matches_at(&self, a_stream: StreamType, a: u64, b_stream: StreamType, b: u64) -> bool {
        a_stream != b_stream && self.within_window(a, b)
    }

    /// Whether two events form a coincidence
    #[inline]
    pub fn is_match(&self, a: &Event, b: &Event) -> bool {
        self.matches_at(a.stream, a.timestamp, b.stream, b.timestamp)
    }

    /// Compare two events
    ///
    /// - same stream: by timestamp; equal timestamps report `Less` so the
    ///   order stays strict (the buffer treats this as a duplicate)
    /// - different streams: `Equal` when matching, otherwise by timestamp
    pub fn compare(&self, a: &Event, b: &Event) -> Ordering {
        if a.stream == b.stream {
            return match a.timestamp.cmp(&b.timestamp) {
                Ordering::Equal => Ordering::Less,
                other => other,
            };
        }

        if self.within_window(a.timestamp, b.timestamp) {
            Ordering::Equal
        } else {
            a.timestamp.cmp(&b.timestamp)
        }
    }
}
