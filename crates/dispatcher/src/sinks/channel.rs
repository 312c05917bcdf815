//! In-process `OutputSink` adapters
//!
//! The matcher calls its sink synchronously; these adapters either queue
//! emissions for the async dispatcher or keep them in memory.

use contracts::{Coincidence, CrossClockRecord, Emission, Event, OutputSink, StreamType};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Forwards matcher output into a bounded channel without blocking
///
/// A full channel drops the emission and counts it; the matcher is never
/// stalled by a slow consumer.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Emission>,
    sent: u64,
    dropped: u64,
    diagnostics: u64,
    closed: bool,
}

impl ChannelSink {
    /// Wrap an existing sender
    pub fn new(tx: mpsc::Sender<Emission>) -> Self {
        Self {
            tx,
            sent: 0,
            dropped: 0,
            diagnostics: 0,
            closed: false,
        }
    }

    /// Create a sink together with the receiving half
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Emission>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Emissions handed to the channel
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Emissions dropped (full or closed channel)
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Cross-clock records forwarded or dropped
    pub fn diagnostics(&self) -> u64 {
        self.diagnostics
    }

    fn send(&mut self, emission: Emission) {
        match self.tx.try_send(emission) {
            Ok(()) => self.sent += 1,
            Err(mpsc::error::TrySendError::Full(e)) => {
                self.dropped += 1;
                metrics::counter!("tscoinc_emissions_dropped_total").increment(1);
                warn!(
                    kind = e.kind(),
                    timestamp = e.timestamp(),
                    "Output channel full, emission dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped += 1;
                metrics::counter!("tscoinc_emissions_dropped_total").increment(1);
                if !self.closed {
                    self.closed = true;
                    error!("Output channel closed, further emissions are dropped");
                }
            }
        }
    }
}

impl OutputSink for ChannelSink {
    fn on_single(&mut self, event: Event) {
        self.send(Emission::Single(event));
    }

    fn on_coincidence(&mut self, pair: Coincidence) {
        self.send(Emission::Coincidence(pair));
    }

    fn on_diagnostic(&mut self, stream: StreamType, sequence_index: u32, cross_clocks: &[u64]) {
        self.diagnostics += 1;
        debug!(
            stream = stream.as_str(),
            seq = sequence_index,
            cross_clocks = ?cross_clocks,
            "Cross-clock timestamps"
        );
        self.send(Emission::Diagnostic(CrossClockRecord {
            stream,
            sequence_index,
            cross_clocks: cross_clocks.to_vec(),
        }));
    }
}

/// Keeps every emission in memory, in emission order
///
/// Cross-clock records are kept apart from singles and coincidences.
#[derive(Debug, Default)]
pub struct CollectingSink {
    emissions: Vec<Emission>,
    cross_clocks: Vec<CrossClockRecord>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All emissions in the order they were produced
    pub fn emissions(&self) -> &[Emission] {
        &self.emissions
    }

    /// Matched pairs only
    pub fn coincidences(&self) -> impl Iterator<Item = &Coincidence> {
        self.emissions.iter().filter_map(|e| match e {
            Emission::Coincidence(pair) => Some(pair),
            _ => None,
        })
    }

    /// Singles only
    pub fn singles(&self) -> impl Iterator<Item = &Event> {
        self.emissions.iter().filter_map(|e| match e {
            Emission::Single(event) => Some(event),
            _ => None,
        })
    }

    /// Cross-clock diagnostics
    pub fn cross_clocks(&self) -> &[CrossClockRecord] {
        &self.cross_clocks
    }

    /// Total events accounted for by the collected emissions
    pub fn event_count(&self) -> usize {
        self.emissions.iter().map(Emission::event_count).sum()
    }

    pub fn len(&self) -> usize {
        self.emissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }

    /// Take the collected emissions, leaving the sink empty
    pub fn take(&mut self) -> Vec<Emission> {
        std::mem::take(&mut self.emissions)
    }

    /// Take the collected cross-clock records
    pub fn take_cross_clocks(&mut self) -> Vec<CrossClockRecord> {
        std::mem::take(&mut self.cross_clocks)
    }
}

impl OutputSink for CollectingSink {
    fn on_single(&mut self, event: Event) {
        self.emissions.push(Emission::Single(event));
    }

    fn on_coincidence(&mut self, pair: Coincidence) {
        self.emissions.push(Emission::Coincidence(pair));
    }

    fn on_diagnostic(&mut self, stream: StreamType, sequence_index: u32, cross_clocks: &[u64]) {
        self.cross_clocks.push(CrossClockRecord {
            stream,
            sequence_index,
            cross_clocks: cross_clocks.to_vec(),
        });
    }
}
