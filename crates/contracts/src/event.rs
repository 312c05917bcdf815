//! Event - decoded detector records
//!
//! Input records from the two trigger streams and the immutable `Event`
//! they become once their timestamps have been reconciled.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Which detector subsystem produced an event.
///
/// The two streams trigger independently; a coincidence always pairs one
/// event of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    /// Gamma-ray array (head) trigger
    Gamma,
    /// Heavy-ion spectrometer (tail) trigger
    HeavyIon,
}

impl StreamType {
    /// Both stream types, in output order
    pub const ALL: [StreamType; 2] = [StreamType::Gamma, StreamType::HeavyIon];

    /// The stream an event of this type can be matched against
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            StreamType::Gamma => StreamType::HeavyIon,
            StreamType::HeavyIon => StreamType::Gamma,
        }
    }

    /// Stable label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            StreamType::Gamma => "gamma",
            StreamType::HeavyIon => "heavy_ion",
        }
    }

    /// Dense index (0 for gamma, 1 for heavy-ion)
    #[inline]
    pub fn index(self) -> usize {
        match self {
            StreamType::Gamma => 0,
            StreamType::HeavyIon => 1,
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp information carried by a raw record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampRecord {
    /// Wrapping 32-bit trigger counter
    Counter(u32),
    /// Timestamp-counter (TSC) word list: version, write time, routing,
    /// sync number, control word, then `(lower, upper)` tick pairs
    Tsc(Vec<u32>),
}

/// Raw record as handed over by the upstream decoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Producing stream
    pub stream: StreamType,

    /// Per-stream serial number; 0 marks the start of a run
    pub sequence_index: u32,

    /// Timestamp source; `None` means the record arrived without one
    #[serde(default)]
    pub timestamp: Option<TimestampRecord>,

    /// Opaque detector payload
    #[serde(default)]
    pub payload: Bytes,
}

impl RawRecord {
    /// Record with a plain 32-bit counter value
    pub fn counter(stream: StreamType, sequence_index: u32, raw: u32, payload: Bytes) -> Self {
        Self {
            stream,
            sequence_index,
            timestamp: Some(TimestampRecord::Counter(raw)),
            payload,
        }
    }

    /// Record with a TSC word list
    pub fn tsc(stream: StreamType, sequence_index: u32, words: Vec<u32>, payload: Bytes) -> Self {
        Self {
            stream,
            sequence_index,
            timestamp: Some(TimestampRecord::Tsc(words)),
            payload,
        }
    }
}

/// Decoded trigger event
///
/// Immutable once created. It leaves the matcher exactly once, either
/// alone as a single or together with its partner as a coincidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Producing stream
    pub stream: StreamType,

    /// Reconciled trigger time in clock ticks (monotonic within a run)
    pub timestamp: u64,

    /// Per-stream serial number of the source record
    pub sequence_index: u32,

    /// Trigger time in microseconds, when the clock frequency is known
    #[serde(default)]
    pub trigger_time_us: Option<f64>,

    /// Opaque detector payload (zero-copy)
    #[serde(default)]
    pub payload: Bytes,
}

impl Event {
    /// Create an event without a physical trigger time
    pub fn new(stream: StreamType, timestamp: u64, sequence_index: u32, payload: Bytes) -> Self {
        Self {
            stream,
            timestamp,
            sequence_index,
            trigger_time_us: None,
            payload,
        }
    }

    /// Attach the trigger time derived from `clock_frequency_mhz`
    ///
    /// Non-positive frequencies leave the trigger time unset.
    pub fn with_clock(mut self, clock_frequency_mhz: f64) -> Self {
        if clock_frequency_mhz > 0.0 {
            self.trigger_time_us = Some(self.timestamp as f64 / clock_frequency_mhz);
        }
        self
    }

    /// Absolute tick distance to another event
    #[inline]
    pub fn time_diff(&self, other: &Event) -> u64 {
        self.timestamp.abs_diff(other.timestamp)
    }
}
