//! Per-stream timestamp reconciliation.
//!
//! The hardware counter is 32 bits wide and wraps. Each stream keeps its
//! own rollover count so that reconstructed timestamps stay monotonic for
//! the whole run.

use contracts::StreamType;
use tracing::debug;

const COUNTER_SPAN: u64 = 1 << 32;

/// Wraparound-aware timestamp reconstruction for one stream
#[derive(Debug, Clone)]
pub struct TimestampReconciler {
    stream: StreamType,
    last_timestamp: u64,
    rollover_count: u64,
}

impl TimestampReconciler {
    pub fn new(stream: StreamType) -> Self {
        Self {
            stream,
            last_timestamp: 0,
            rollover_count: 0,
        }
    }

    /// Reconstruct the 64-bit timestamp for a raw counter value
    ///
    /// A sequence index of 0 starts a new run and resets the state. A raw
    /// value that would step backwards counts as one rollover.
    pub fn reconcile(&mut self, raw: u32, sequence_index: u32) -> u64 {
        if sequence_index == 0 {
            self.reset();
        }

        let mut candidate = u64::from(raw) + self.rollover_count * COUNTER_SPAN;
        if candidate < self.last_timestamp {
            self.rollover_count += 1;
            candidate = u64::from(raw) + self.rollover_count * COUNTER_SPAN;
            debug!(
                stream = %self.stream,
                sequence_index,
                raw,
                rollover_count = self.rollover_count,
                "counter rollover"
            );
            metrics::counter!("tscoinc_counter_rollovers_total", "stream" => self.stream.as_str())
                .increment(1);
        }

        self.last_timestamp = candidate;
        candidate
    }

    /// Forget all history (start of run)
    pub fn reset(&mut self) {
        self.last_timestamp = 0;
        self.rollover_count = 0;
    }

    pub fn stream(&self) -> StreamType {
        self.stream
    }

    /// Rollovers seen since the last reset
    pub fn rollover_count(&self) -> u64 {
        self.rollover_count
    }

    /// Last reconstructed timestamp
    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }
}
