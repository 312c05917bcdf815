//! Two-stream temporal merge.
//!
//! Each stream delivers records in non-decreasing timestamp order. The
//! merger only releases a record once every open stream has a pending
//! head, so the combined output is non-decreasing as well.
//!
//! Ordering key: `(timestamp, stream index, arrival)`; gamma wins ties.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use contracts::StreamType;
use tracing::warn;

use crate::decoder::DecodedRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MergeKey {
    timestamp: u64,
    stream: usize,
    arrival: u64,
}

#[derive(Debug)]
struct Pending {
    key: MergeKey,
    record: DecodedRecord,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Two-way merge of per-stream decoded records
#[derive(Debug)]
pub struct StreamMerger {
    heap: BinaryHeap<Reverse<Pending>>,
    pending: [usize; 2],
    open: [bool; 2],
    arrivals: u64,
    last_emitted: Option<u64>,
    out_of_order: u64,
}

impl Default for StreamMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamMerger {
    /// Merger with both streams open
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: [0; 2],
            open: [true; 2],
            arrivals: 0,
            last_emitted: None,
            out_of_order: 0,
        }
    }

    /// Queue a record from its stream
    pub fn push(&mut self, record: DecodedRecord) {
        let stream = record.event.stream;
        if !self.open[stream.index()] {
            warn!(
                stream = %stream,
                sequence_index = record.event.sequence_index,
                "record pushed after stream closed"
            );
        }

        let key = MergeKey {
            timestamp: record.event.timestamp,
            stream: stream.index(),
            arrival: self.arrivals,
        };
        self.arrivals += 1;
        self.pending[stream.index()] += 1;
        self.heap.push(Reverse(Pending { key, record }));
    }

    /// Mark a stream as finished
    pub fn close(&mut self, stream: StreamType) {
        self.open[stream.index()] = false;
    }

    pub fn is_open(&self, stream: StreamType) -> bool {
        self.open[stream.index()]
    }

    /// Open stream with nothing queued, i.e. the one the merge waits on
    pub fn waiting_on(&self) -> Option<StreamType> {
        StreamType::ALL
            .into_iter()
            .find(|s| self.open[s.index()] && self.pending[s.index()] == 0)
    }

    /// Next record, if it is safe to release
    pub fn pop_ready(&mut self) -> Option<DecodedRecord> {
        if self.heap.is_empty() || self.waiting_on().is_some() {
            return None;
        }
        self.pop_min()
    }

    /// Next record regardless of open streams
    pub fn pop_any(&mut self) -> Option<DecodedRecord> {
        self.pop_min()
    }

    /// Queued records
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Both streams closed and nothing queued
    pub fn is_finished(&self) -> bool {
        self.heap.is_empty() && !self.open.iter().any(|o| *o)
    }

    /// Released records whose timestamp went backwards
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order
    }

    fn pop_min(&mut self) -> Option<DecodedRecord> {
        let Reverse(Pending { key, record }) = self.heap.pop()?;
        self.pending[key.stream] -= 1;

        if let Some(last) = self.last_emitted {
            if key.timestamp < last {
                self.out_of_order += 1;
                warn!(
                    stream = %record.event.stream,
                    sequence_index = record.event.sequence_index,
                    timestamp = key.timestamp,
                    last,
                    "merged record out of order"
                );
            }
        }
        self.last_emitted = Some(self.last_emitted.map_or(key.timestamp, |l| l.max(key.timestamp)));
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::Event;

    fn make_record(stream: StreamType, timestamp: u64) -> DecodedRecord {
        DecodedRecord {
            event: Event::new(stream, timestamp, 0, Bytes::new()),
            cross_clocks: Vec::new(),
        }
    }

    #[test]
    fn test_waits_for_both_heads() {
        let mut merger = StreamMerger::new();
        merger.push(make_record(StreamType::Gamma, 10));
        merger.push(make_record(StreamType::Gamma, 20));

        assert_eq!(merger.waiting_on(), Some(StreamType::HeavyIon));
        assert!(merger.pop_ready().is_none());

        merger.push(make_record(StreamType::HeavyIon, 15));
        assert_eq!(merger.pop_ready().unwrap().event.timestamp, 10);
        assert_eq!(merger.pop_ready().unwrap().event.timestamp, 15);
        // Heavy-ion queue empty again
        assert!(merger.pop_ready().is_none());
    }

    #[test]
    fn test_closed_stream_releases_rest() {
        let mut merger = StreamMerger::new();
        merger.push(make_record(StreamType::Gamma, 10));
        merger.push(make_record(StreamType::Gamma, 20));
        merger.close(StreamType::HeavyIon);

        assert_eq!(merger.pop_ready().unwrap().event.timestamp, 10);
        assert_eq!(merger.pop_ready().unwrap().event.timestamp, 20);
        assert!(merger.pop_ready().is_none());

        merger.close(StreamType::Gamma);
        assert!(merger.is_finished());
    }

    #[test]
    fn test_ties_prefer_gamma() {
        let mut merger = StreamMerger::new();
        merger.push(make_record(StreamType::HeavyIon, 50));
        merger.push(make_record(StreamType::Gamma, 50));
        merger.close(StreamType::Gamma);
        merger.close(StreamType::HeavyIon);

        assert_eq!(merger.pop_ready().unwrap().event.stream, StreamType::Gamma);
        assert_eq!(
            merger.pop_ready().unwrap().event.stream,
            StreamType::HeavyIon
        );
    }

    #[test]
    fn test_interleaved_output_is_sorted() {
        let mut merger = StreamMerger::new();
        for t in [1, 4, 9, 12] {
            merger.push(make_record(StreamType::Gamma, t));
        }
        for t in [2, 3, 10, 11] {
            merger.push(make_record(StreamType::HeavyIon, t));
        }
        merger.close(StreamType::Gamma);
        merger.close(StreamType::HeavyIon);

        let out: Vec<u64> = std::iter::from_fn(|| merger.pop_ready())
            .map(|r| r.event.timestamp)
            .collect();
        assert_eq!(out, vec![1, 2, 3, 4, 9, 10, 11, 12]);
        assert_eq!(merger.out_of_order_count(), 0);
    }

    #[test]
    fn test_pop_any_ignores_open_streams() {
        let mut merger = StreamMerger::new();
        merger.push(make_record(StreamType::HeavyIon, 5));
        assert!(merger.pop_ready().is_none());
        assert_eq!(merger.pop_any().unwrap().event.timestamp, 5);
        assert!(merger.is_empty());
    }
}
