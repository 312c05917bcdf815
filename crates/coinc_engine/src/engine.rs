//! Correlation engine: buffered two-stream coincidence matching.

use std::time::{Duration, Instant};

use contracts::{
    Coincidence, Event, MatchingConfig, OutputSink, OverflowPolicy, QueueDiagnostics, StreamType,
};
use thiserror::Error;
use tracing::instrument;
use validator::Validate;

use crate::buffer::{BufferError, EventHandle, OrderedEventBuffer};
use crate::policy::MatchPolicy;

/// Result of pushing one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Paired with a buffered event and emitted as a coincidence
    Matched,
    /// Stored, waiting for a partner or for its window to expire
    Buffered,
    /// Same stream already buffered this timestamp; the event was discarded
    Duplicate,
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Matching configuration rejected at construction
    #[error("invalid matching config: {0}")]
    InvalidConfig(String),

    /// Buffer full under `OverflowPolicy::Reject`; the event is handed back
    #[error("buffer full ({capacity} events), rejected {} event at {}", .event.stream, .event.timestamp)]
    CapacityExceeded { event: Box<Event>, capacity: usize },
}

/// Outcome of a bounded flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Buffered entries released through the sink
    pub flushed: usize,
    /// Entries dropped after the time limit expired
    pub discarded: usize,
    /// Whether the time limit was hit
    pub timed_out: bool,
}

/// Two-stream coincidence matcher
///
/// Events must arrive with non-decreasing timestamps within each stream.
/// Every pushed event leaves exactly once through the sink, as a single or
/// as half of a coincidence, unless it is a duplicate, rejected, or
/// discarded by a timed-out flush.
#[derive(Debug)]
pub struct CorrelationEngine<S: OutputSink> {
    config: MatchingConfig,
    buffer: OrderedEventBuffer,
    sink: S,
    diagnostics: QueueDiagnostics,
}

impl<S: OutputSink> CorrelationEngine<S> {
    /// Create an engine writing to `sink`
    ///
    /// # Errors
    /// `InvalidConfig` if the windows or capacity fail validation.
    pub fn new(config: MatchingConfig, sink: S) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        let policy = MatchPolicy::new(config.coincidence_window);
        let buffer = OrderedEventBuffer::new(policy, config.capacity);

        Ok(Self {
            config,
            buffer,
            sink,
            diagnostics: QueueDiagnostics::default(),
        })
    }

    /// Push one event
    ///
    /// Matches it against the buffer, releases the oldest entry when the
    /// buffered span reached `max_window`, then stores it.
    #[instrument(
        level = "trace",
        name = "coinc_engine_push",
        skip(self, event),
        fields(stream = %event.stream, timestamp = event.timestamp, sequence_index = event.sequence_index)
    )]
    pub fn push(&mut self, event: Event) -> Result<PushOutcome, EngineError> {
        self.diagnostics.pushed += 1;
        self.diagnostics.first_timestamp.get_or_insert(event.timestamp);
        self.diagnostics.last_timestamp = Some(event.timestamp);
        let time_diff = self
            .buffer
            .earliest()
            .map(|h| event.timestamp.saturating_sub(h.timestamp()))
            .unwrap_or(0);

        let outcome = self.push_inner(event);

        self.diagnostics.size = self.buffer.len();
        self.diagnostics.time_diff = time_diff;
        metrics::gauge!("tscoinc_buffer_depth").set(self.buffer.len() as f64);
        outcome
    }

    fn push_inner(&mut self, event: Event) -> Result<PushOutcome, EngineError> {
        if let Some(partner) = self
            .buffer
            .find_equivalent(&event)
            .and_then(|handle| self.buffer.erase(handle))
        {
            self.emit_coincidence(event, partner);
            return Ok(PushOutcome::Matched);
        }

        if self.buffer.span() >= self.config.max_window {
            self.pop();
        }

        let event = match self.buffer.insert(event) {
            Ok(_) => return Ok(PushOutcome::Buffered),
            Err(BufferError::DuplicateEvent { event }) => {
                self.diagnostics.duplicates += 1;
                tracing::warn!(
                    stream = %event.stream,
                    sequence_index = event.sequence_index,
                    timestamp = event.timestamp,
                    "duplicate event discarded"
                );
                metrics::counter!("tscoinc_duplicates_total", "stream" => event.stream.as_str())
                    .increment(1);
                return Ok(PushOutcome::Duplicate);
            }
            Err(BufferError::CapacityExceeded { event, capacity }) => {
                self.handle_overflow(event, capacity)?
            }
        };

        self.buffer
            .insert(event)
            .map(|_| PushOutcome::Buffered)
            .map_err(|e| EngineError::CapacityExceeded {
                capacity: self.buffer.capacity(),
                event: Box::new(e.into_event()),
            })
    }

    /// Apply the overflow policy; returns the event to retry on success
    fn handle_overflow(&mut self, event: Box<Event>, capacity: usize) -> Result<Event, EngineError> {
        match self.config.overflow_policy {
            OverflowPolicy::Reject => {
                self.diagnostics.rejected += 1;
                tracing::warn!(
                    stream = %event.stream,
                    sequence_index = event.sequence_index,
                    timestamp = event.timestamp,
                    capacity,
                    "buffer full, event rejected"
                );
                metrics::counter!("tscoinc_rejected_total", "stream" => event.stream.as_str())
                    .increment(1);
                Err(EngineError::CapacityExceeded { event, capacity })
            }
            OverflowPolicy::EvictOldest => {
                self.diagnostics.forced_evictions += 1;
                tracing::warn!(
                    stream = %event.stream,
                    sequence_index = event.sequence_index,
                    timestamp = event.timestamp,
                    capacity,
                    span = self.buffer.span(),
                    "buffer full, evicting oldest event"
                );
                metrics::counter!("tscoinc_forced_evictions_total").increment(1);
                self.pop();
                Ok(*event)
            }
        }
    }

    /// Release the earliest buffered event as a single
    ///
    /// No-op on an empty buffer.
    #[instrument(level = "trace", name = "coinc_engine_pop", skip(self))]
    pub fn pop(&mut self) {
        let Some(first) = self.buffer.earliest() else {
            return;
        };

        let late = self
            .buffer
            .get(first)
            .and_then(|event| self.buffer.find_equivalent(event));
        if let Some(late) = late {
            self.drop_late_match(first, late);
            return;
        }

        if let Some(event) = self.buffer.erase(first) {
            self.emit_single(event);
        }
    }

    /// Pop until the buffer is empty
    #[instrument(level = "debug", name = "coinc_engine_cleanup", skip(self), fields(size = self.buffer.len()))]
    pub fn cleanup(&mut self) {
        while !self.buffer.is_empty() {
            self.pop();
        }
        self.diagnostics.size = 0;
        self.diagnostics.time_diff = 0;
    }

    /// Drain the buffer, optionally bounded in wall-clock time
    ///
    /// Once `max_time` has elapsed the remaining events are discarded.
    #[instrument(level = "debug", name = "coinc_engine_flush", skip(self), fields(size = self.buffer.len()))]
    pub fn flush(&mut self, max_time: Option<Duration>) -> FlushReport {
        let started = Instant::now();
        let mut report = FlushReport::default();

        while !self.buffer.is_empty() {
            if max_time.is_some_and(|limit| started.elapsed() >= limit) {
                report.timed_out = true;
                break;
            }
            self.flush_step();
            report.flushed += 1;
        }

        if report.timed_out {
            report.discarded = self.buffer.clear();
            self.diagnostics.discarded += report.discarded as u64;
            tracing::warn!(
                discarded = report.discarded,
                flushed = report.flushed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "flush time limit reached, discarding remaining events"
            );
            metrics::counter!("tscoinc_discarded_total").increment(report.discarded as u64);
        }

        self.diagnostics.size = 0;
        self.diagnostics.time_diff = 0;
        report
    }

    /// Pop once; returns the buffer size before the pop
    pub fn flush_step(&mut self) -> usize {
        let size = self.buffer.len();
        if size > 0 {
            self.pop();
        }
        self.diagnostics.size = self.buffer.len();
        self.diagnostics.time_diff = 0;
        size
    }

    /// Forward decoded cross-clock timestamps to the sink
    pub fn record_cross_clocks(&mut self, stream: StreamType, sequence_index: u32, values: &[u64]) {
        if !values.is_empty() {
            self.sink.on_diagnostic(stream, sequence_index, values);
        }
    }

    /// Maximum buffered span in ticks
    pub fn max_window(&self) -> u64 {
        self.config.max_window
    }

    /// Change the buffered span limit
    ///
    /// Takes effect on the next push; values below the coincidence window
    /// are raised to it.
    pub fn set_max_window(&mut self, max_window: u64) {
        let max_window = max_window.max(self.config.coincidence_window);
        tracing::debug!(old = self.config.max_window, new = max_window, "max window changed");
        self.config.max_window = max_window;
    }

    /// Coincidence window in ticks
    pub fn coincidence_window(&self) -> u64 {
        self.config.coincidence_window
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Read-only view of the buffered events
    pub fn buffer(&self) -> &OrderedEventBuffer {
        &self.buffer
    }

    pub fn diagnostics(&self) -> &QueueDiagnostics {
        &self.diagnostics
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the engine and return its sink
    ///
    /// Buffered events are not flushed; call `cleanup` first.
    pub fn into_sink(self) -> S {
        if !self.buffer.is_empty() {
            tracing::warn!(
                size = self.buffer.len(),
                "engine dropped with buffered events, they will not be emitted"
            );
        }
        self.sink
    }

    fn emit_coincidence(&mut self, incoming: Event, partner: Event) {
        let (stream, incoming_ts, partner_ts) =
            (incoming.stream, incoming.timestamp, partner.timestamp);
        let Some(pair) = Coincidence::from_pair(incoming, partner) else {
            self.diagnostics.inconsistencies += 1;
            tracing::warn!(
                stream = stream.as_str(),
                incoming_timestamp = incoming_ts,
                partner_timestamp = partner_ts,
                "matched events share a stream, dropping both"
            );
            metrics::counter!("tscoinc_inconsistencies_total").increment(1);
            debug_assert!(false, "same-stream coincidence");
            return;
        };

        self.diagnostics.coincidences += 1;
        metrics::counter!("tscoinc_coincidences_total").increment(1);
        metrics::histogram!("tscoinc_coincidence_dt_ticks").record(pair.time_diff() as f64);
        tracing::trace!(
            gamma = pair.gamma.timestamp,
            heavy_ion = pair.heavy_ion.timestamp,
            "coincidence"
        );
        self.sink.on_coincidence(pair);
    }

    fn emit_single(&mut self, event: Event) {
        self.diagnostics.singles[event.stream.index()] += 1;
        metrics::counter!("tscoinc_singles_total", "stream" => event.stream.as_str()).increment(1);
        self.sink.on_single(event);
    }

    /// The earliest entry still has a partner: the buffer invariant broke
    fn drop_late_match(&mut self, first: EventHandle, late: EventHandle) {
        let first = self.buffer.erase(first);
        let late = self.buffer.erase(late);
        self.diagnostics.inconsistencies += 1;

        tracing::warn!(
            first_stream = ?first.as_ref().map(|e| e.stream),
            first_timestamp = ?first.as_ref().map(|e| e.timestamp),
            first_sequence_index = ?first.as_ref().map(|e| e.sequence_index),
            late_timestamp = ?late.as_ref().map(|e| e.timestamp),
            late_sequence_index = ?late.as_ref().map(|e| e.sequence_index),
            "buffered events still match at pop, dropping both"
        );
        metrics::counter!("tscoinc_inconsistencies_total").increment(1);

        debug_assert!(
            false,
            "buffer inconsistency: earliest event still has a coincident partner"
        );
    }

    #[cfg(test)]
    pub(crate) fn buffer_mut(&mut self) -> &mut OrderedEventBuffer {
        &mut self.buffer
    }
}
