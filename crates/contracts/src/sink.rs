//! Output interfaces
//!
//! `OutputSink` is the synchronous callback surface of the matcher.
//! `DataSink` is the asynchronous writer interface used by the dispatcher.

use serde::{Deserialize, Serialize};

use crate::{ContractError, Event, StreamType};

/// Matched pair, roles fixed by stream type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coincidence {
    /// Gamma-side event
    pub gamma: Event,
    /// Heavy-ion-side event
    pub heavy_ion: Event,
}

impl Coincidence {
    /// Build a coincidence from two events in either arrival order
    ///
    /// Returns `None` if both events come from the same stream.
    pub fn from_pair(first: Event, second: Event) -> Option<Self> {
        match (first.stream, second.stream) {
            (StreamType::Gamma, StreamType::HeavyIon) => Some(Self {
                gamma: first,
                heavy_ion: second,
            }),
            (StreamType::HeavyIon, StreamType::Gamma) => Some(Self {
                gamma: second,
                heavy_ion: first,
            }),
            _ => None,
        }
    }

    /// Heavy-ion time minus gamma time, in ticks
    pub fn time_diff(&self) -> i128 {
        self.heavy_ion.timestamp as i128 - self.gamma.timestamp as i128
    }

    /// Earlier of the two timestamps
    pub fn earliest_timestamp(&self) -> u64 {
        self.gamma.timestamp.min(self.heavy_ion.timestamp)
    }
}

/// Cross-clock timestamps carried by one TSC record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossClockRecord {
    pub stream: StreamType,
    pub sequence_index: u32,
    pub cross_clocks: Vec<u64>,
}

/// Owned matcher output, as queued for asynchronous sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Emission {
    /// Unmatched event whose retention window expired
    Single(Event),
    /// Matched gamma / heavy-ion pair
    Coincidence(Coincidence),
    /// Auxiliary cross-clock timestamps, not an event
    Diagnostic(CrossClockRecord),
}

impl Emission {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Emission::Single(_) => "single",
            Emission::Coincidence(_) => "coincidence",
            Emission::Diagnostic(_) => "diagnostic",
        }
    }

    /// Number of input events this emission accounts for
    pub fn event_count(&self) -> usize {
        match self {
            Emission::Single(_) => 1,
            Emission::Coincidence(_) => 2,
            Emission::Diagnostic(_) => 0,
        }
    }

    /// Earliest trigger timestamp contained in the emission
    ///
    /// Diagnostics have no trigger time; their first cross-clock value is used.
    pub fn timestamp(&self) -> u64 {
        match self {
            Emission::Single(event) => event.timestamp,
            Emission::Coincidence(pair) => pair.earliest_timestamp(),
            Emission::Diagnostic(record) => record.cross_clocks.first().copied().unwrap_or(0),
        }
    }
}

/// Receiver of matcher output
///
/// Called synchronously from inside the matcher, so implementations must
/// return promptly; anything slow belongs behind a queue.
pub trait OutputSink {
    /// Unmatched event, emitted once its window has expired
    fn on_single(&mut self, event: Event);

    /// Matched pair
    fn on_coincidence(&mut self, pair: Coincidence);

    /// Auxiliary cross-clock timestamps decoded from a TSC record
    fn on_diagnostic(&mut self, _stream: StreamType, _sequence_index: u32, _cross_clocks: &[u64]) {}
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn on_single(&mut self, event: Event) {
        (**self).on_single(event)
    }

    fn on_coincidence(&mut self, pair: Coincidence) {
        (**self).on_coincidence(pair)
    }

    fn on_diagnostic(&mut self, stream: StreamType, sequence_index: u32, cross_clocks: &[u64]) {
        (**self).on_diagnostic(stream, sequence_index, cross_clocks)
    }
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn on_single(&mut self, event: Event) {
        (**self).on_single(event)
    }

    fn on_coincidence(&mut self, pair: Coincidence) {
        (**self).on_coincidence(pair)
    }

    fn on_diagnostic(&mut self, stream: StreamType, sequence_index: u32, cross_clocks: &[u64]) {
        (**self).on_diagnostic(stream, sequence_index, cross_clocks)
    }
}

/// Data output trait
///
/// All dispatcher sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one emission
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, emission: &Emission) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn event(stream: StreamType, timestamp: u64) -> Event {
        Event::new(stream, timestamp, 0, Bytes::new())
    }

    #[test]
    fn test_roles_independent_of_order() {
        let a = Coincidence::from_pair(
            event(StreamType::HeavyIon, 105),
            event(StreamType::Gamma, 100),
        )
        .unwrap();
        assert_eq!(a.gamma.timestamp, 100);
        assert_eq!(a.heavy_ion.timestamp, 105);
        assert_eq!(a.time_diff(), 5);

        let b = Coincidence::from_pair(
            event(StreamType::Gamma, 100),
            event(StreamType::HeavyIon, 105),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_stream_pair_rejected() {
        assert!(Coincidence::from_pair(
            event(StreamType::Gamma, 1),
            event(StreamType::Gamma, 2)
        )
        .is_none());
    }

    #[test]
    fn test_emission_serializes_with_kind_tag() {
        let emission = Emission::Single(event(StreamType::Gamma, 7));
        let json = serde_json::to_string(&emission).unwrap();
        assert!(json.contains("\"kind\":\"single\""));
        assert_eq!(emission.event_count(), 1);
        assert_eq!(emission.timestamp(), 7);
    }

    #[test]
    fn test_diagnostic_emission_shape() {
        let emission = Emission::Diagnostic(CrossClockRecord {
            stream: StreamType::HeavyIon,
            sequence_index: 4,
            cross_clocks: vec![21, 22],
        });
        let value = serde_json::to_value(&emission).unwrap();
        assert_eq!(value["kind"], "diagnostic");
        assert_eq!(value["sequence_index"], 4);
        assert_eq!(value["cross_clocks"], serde_json::json!([21, 22]));
        assert_eq!(emission.event_count(), 0);
        assert_eq!(emission.timestamp(), 21);

        let back: Emission = serde_json::from_value(value).unwrap();
        assert_eq!(back, emission);
    }
}
