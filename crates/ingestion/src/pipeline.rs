//! Ingestion Pipeline main entry

use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender};
use contracts::{RawRecord, StreamType};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{IngestionConfig, IngestionMetrics};
use crate::decoder::{DecodedRecord, StreamDecoder};
use crate::error::{IngestionError, Result};
use crate::merge::StreamMerger;

type RecordIter = Box<dyn Iterator<Item = RawRecord> + Send>;

/// Ingestion Pipeline
///
/// One decoding task per stream feeds a bounded channel; a single
/// consumer (`MergedStream`) merges both channels in time order.
pub struct IngestionPipeline {
    config: IngestionConfig,

    /// Registered record sources, indexed by `StreamType::index`
    sources: [Option<RecordIter>; 2],

    /// Shared metrics
    metrics: Arc<IngestionMetrics>,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline
    ///
    /// # Errors
    /// `InvalidClockFrequency` if the configured frequency is unusable.
    pub fn new(config: IngestionConfig) -> Result<Self> {
        let freq = config.clock_frequency_mhz;
        if !freq.is_finite() || freq <= 0.0 {
            return Err(IngestionError::InvalidClockFrequency(freq));
        }

        Ok(Self {
            config,
            sources: [None, None],
            metrics: Arc::new(IngestionMetrics::new()),
        })
    }

    /// Register the record source of one stream
    ///
    /// Records must be in acquisition order.
    #[instrument(name = "ingestion_register_source", skip(self, records), fields(stream = %stream))]
    pub fn register_source<I>(&mut self, stream: StreamType, records: I) -> Result<()>
    where
        I: IntoIterator<Item = RawRecord>,
        I::IntoIter: Send + 'static,
    {
        let slot = &mut self.sources[stream.index()];
        if slot.is_some() {
            return Err(IngestionError::AlreadyRegistered { stream });
        }
        *slot = Some(Box::new(records.into_iter()));
        debug!(stream = %stream, "registered record source");
        Ok(())
    }

    /// Get registered source count
    pub fn source_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_some()).count()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Spawn the decoding tasks and return the merged output
    ///
    /// Must be called inside a tokio runtime.
    #[instrument(name = "ingestion_start", skip(self))]
    pub fn start(self) -> Result<MergedStream> {
        info!(count = self.source_count(), "starting stream decoders");

        let capacity = self.config.channel_capacity.max(1);
        let mut receivers: [Option<Receiver<DecodedRecord>>; 2] = [None, None];
        let mut merger = StreamMerger::new();
        let mut tasks = Vec::new();

        for (stream, source) in StreamType::ALL.into_iter().zip(self.sources) {
            let Some(records) = source else {
                merger.close(stream);
                continue;
            };

            let decoder = StreamDecoder::new(stream, self.config.clock_frequency_mhz)?;
            let (tx, rx) = bounded(capacity);
            receivers[stream.index()] = Some(rx);
            tasks.push(tokio::spawn(run_stream(
                decoder,
                records,
                tx,
                self.metrics.clone(),
            )));
        }

        Ok(MergedStream {
            receivers,
            merger,
            tasks,
            metrics: self.metrics,
        })
    }
}

/// Decode one stream's records into its channel
async fn run_stream(
    mut decoder: StreamDecoder,
    records: RecordIter,
    tx: Sender<DecodedRecord>,
    metrics: Arc<IngestionMetrics>,
) {
    let stream = decoder.stream();
    debug!(stream = %stream, "stream decoder started");

    for record in records {
        metrics.record_received();
        let sequence_index = record.sequence_index;

        match decoder.decode(record) {
            Ok(decoded) => {
                metrics.record_decoded();
                if tx.send(decoded).await.is_err() {
                    debug!(stream = %stream, "merge consumer dropped, stopping decoder");
                    break;
                }
            }
            Err(e) if e.is_record_level() => {
                metrics.record_decode_error();
                metrics::counter!("tscoinc_decode_errors_total", "stream" => stream.as_str())
                    .increment(1);
                warn!(stream = %stream, sequence_index, error = %e, "record skipped");
            }
            Err(e) => {
                metrics.record_decode_error();
                error!(stream = %stream, sequence_index, error = %e, "stream decoder aborted");
                break;
            }
        }
    }

    debug!(
        stream = %stream,
        decoded = decoder.decoded(),
        rollovers = decoder.reconciler().rollover_count(),
        "stream decoder finished"
    );
}

/// Time-ordered output of an `IngestionPipeline`
pub struct MergedStream {
    receivers: [Option<Receiver<DecodedRecord>>; 2],
    merger: StreamMerger,
    tasks: Vec<JoinHandle<()>>,
    metrics: Arc<IngestionMetrics>,
}

impl MergedStream {
    /// Next record in timestamp order; `None` once both streams are done
    pub async fn next(&mut self) -> Option<DecodedRecord> {
        loop {
            if let Some(record) = self.merger.pop_ready() {
                self.metrics.record_merged();
                self.metrics.update_queue_len(self.merger.len());
                return Some(record);
            }

            let stream = self.merger.waiting_on()?;
            let received = match &self.receivers[stream.index()] {
                Some(rx) => rx.recv().await.ok(),
                None => None,
            };

            match received {
                Some(record) => self.merger.push(record),
                None => {
                    debug!(stream = %stream, "stream closed");
                    self.receivers[stream.index()] = None;
                    self.merger.close(stream);
                }
            }
        }
    }

    /// Merge state (queued records, out-of-order count)
    pub fn merger(&self) -> &StreamMerger {
        &self.merger
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Stop reading and wait for the decoding tasks to exit
    pub async fn shutdown(mut self) {
        for rx in self.receivers.iter_mut().filter_map(Option::take) {
            rx.close();
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "stream decoder task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn counter_records(stream: StreamType, raws: &[u32]) -> Vec<RawRecord> {
        raws.iter()
            .enumerate()
            .map(|(idx, raw)| RawRecord::counter(stream, idx as u32, *raw, Bytes::new()))
            .collect()
    }

    #[test]
    fn test_invalid_frequency_rejected() {
        let result = IngestionPipeline::new(IngestionConfig::new(8, 0.0));
        assert!(matches!(
            result,
            Err(IngestionError::InvalidClockFrequency(_))
        ));
    }

    #[test]
    fn test_register_twice_rejected() {
        let mut pipeline = IngestionPipeline::new(IngestionConfig::default()).unwrap();
        pipeline
            .register_source(StreamType::Gamma, Vec::new())
            .unwrap();
        let err = pipeline
            .register_source(StreamType::Gamma, Vec::new())
            .unwrap_err();
        assert!(matches!(err, IngestionError::AlreadyRegistered { .. }));
        assert_eq!(pipeline.source_count(), 1);
    }

    #[tokio::test]
    async fn test_merged_output_is_time_ordered() {
        let mut pipeline = IngestionPipeline::new(IngestionConfig::new(2, 20.0)).unwrap();
        pipeline
            .register_source(
                StreamType::Gamma,
                counter_records(StreamType::Gamma, &[10, 30, 50, 70]),
            )
            .unwrap();
        pipeline
            .register_source(
                StreamType::HeavyIon,
                counter_records(StreamType::HeavyIon, &[5, 35, 36, 90]),
            )
            .unwrap();

        let mut merged = pipeline.start().unwrap();
        let mut out = Vec::new();
        while let Some(record) = merged.next().await {
            out.push(record.event.timestamp);
        }

        assert_eq!(out, vec![5, 10, 30, 35, 36, 50, 70, 90]);
        let snapshot = merged.metrics().snapshot();
        assert_eq!(snapshot.records_received, 8);
        assert_eq!(snapshot.records_merged, 8);
        merged.shutdown().await;
    }

    #[tokio::test]
    async fn test_single_stream_and_bad_records() {
        let mut pipeline = IngestionPipeline::new(IngestionConfig::default()).unwrap();
        let mut records = counter_records(StreamType::HeavyIon, &[1, 2, 3]);
        records[1].timestamp = None;
        pipeline
            .register_source(StreamType::HeavyIon, records)
            .unwrap();

        let mut merged = pipeline.start().unwrap();
        let mut out = Vec::new();
        while let Some(record) = merged.next().await {
            out.push(record.event.timestamp);
        }

        assert_eq!(out, vec![1, 3]);
        assert_eq!(merged.metrics().snapshot().decode_errors, 1);
        merged.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_sources() {
        let pipeline = IngestionPipeline::new(IngestionConfig::default()).unwrap();
        let mut merged = pipeline.start().unwrap();
        assert!(merged.next().await.is_none());
    }
}
