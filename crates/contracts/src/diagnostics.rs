//! QueueDiagnostics - matcher bookkeeping
//!
//! Updated by the correlation engine after every push and every flushed
//! event; read by observability and the CLI run summary.

use serde::{Deserialize, Serialize};

use crate::StreamType;

/// Counters and gauges describing the matcher state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueDiagnostics {
    /// Buffered events after the last operation
    pub size: usize,

    /// Tick distance between the last pushed event and the earliest buffered one
    /// (0 while flushing)
    pub time_diff: u64,

    /// Events pushed into the matcher
    pub pushed: u64,

    /// Coincidence pairs emitted
    pub coincidences: u64,

    /// Singles emitted, indexed by `StreamType::index`
    pub singles: [u64; 2],

    /// Incoming events discarded as same-stream duplicates
    pub duplicates: u64,

    /// Events released early because the buffer hit its hard ceiling
    pub forced_evictions: u64,

    /// Events handed back to the caller by the reject overflow policy
    pub rejected: u64,

    /// Late matches found while popping (both entries dropped)
    pub inconsistencies: u64,

    /// Events dropped because a bounded flush ran out of time
    pub discarded: u64,

    /// First pushed timestamp of the run
    pub first_timestamp: Option<u64>,

    /// Latest pushed timestamp of the run
    pub last_timestamp: Option<u64>,
}

impl QueueDiagnostics {
    /// Reset all fields (start of run)
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Singles emitted for one stream
    pub fn singles_for(&self, stream: StreamType) -> u64 {
        self.singles[stream.index()]
    }

    /// Singles emitted across both streams
    pub fn total_singles(&self) -> u64 {
        self.singles.iter().sum()
    }

    /// Events delivered to the output sink (singles + 2 × coincidences)
    pub fn emitted_events(&self) -> u64 {
        self.total_singles() + 2 * self.coincidences
    }

    /// Ticks elapsed between the first and latest pushed event
    pub fn elapsed_ticks(&self) -> u64 {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        }
    }

    /// Coincidence rate in Hz for the given trigger clock
    pub fn coincidence_rate_hz(&self, clock_frequency_mhz: f64) -> f64 {
        self.rate_hz(self.coincidences, clock_frequency_mhz)
    }

    /// Singles rate in Hz for one stream
    pub fn singles_rate_hz(&self, stream: StreamType, clock_frequency_mhz: f64) -> f64 {
        self.rate_hz(self.singles_for(stream), clock_frequency_mhz)
    }

    fn rate_hz(&self, count: u64, clock_frequency_mhz: f64) -> f64 {
        let ticks = self.elapsed_ticks();
        if ticks == 0 || clock_frequency_mhz <= 0.0 {
            return 0.0;
        }
        let seconds = ticks as f64 / (clock_frequency_mhz * 1e6);
        count as f64 / seconds
    }
}
