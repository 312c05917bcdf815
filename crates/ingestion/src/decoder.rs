//! Record → Event decoding for one stream.

use contracts::{Event, RawRecord, StreamType, TimestampRecord};
use tracing::warn;

use crate::error::{IngestionError, Result};
use crate::reconciler::TimestampReconciler;
use crate::tsc::{decode_tsc, TscWarning};

/// Decoded record: the event plus auxiliary cross-clock values
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub event: Event,
    /// Cross-clock timestamps from a TSC record (empty for counter records)
    pub cross_clocks: Vec<u64>,
}

/// Turns the raw records of one stream into events
///
/// Owns the stream's `TimestampReconciler`; counter records go through it,
/// TSC records already carry a wide value and bypass it.
#[derive(Debug)]
pub struct StreamDecoder {
    stream: StreamType,
    clock_frequency_mhz: f64,
    reconciler: TimestampReconciler,
    decoded: u64,
}

impl StreamDecoder {
    /// Create a decoder for `stream`
    ///
    /// # Errors
    /// `InvalidClockFrequency` if the frequency is not finite and > 0.
    pub fn new(stream: StreamType, clock_frequency_mhz: f64) -> Result<Self> {
        if !clock_frequency_mhz.is_finite() || clock_frequency_mhz <= 0.0 {
            return Err(IngestionError::InvalidClockFrequency(clock_frequency_mhz));
        }
        Ok(Self {
            stream,
            clock_frequency_mhz,
            reconciler: TimestampReconciler::new(stream),
            decoded: 0,
        })
    }

    /// Decode one record
    ///
    /// # Errors
    /// Record-level errors (`MissingTimestampRecord`, TSC decoding failures)
    /// affect only this record; the decoder stays usable.
    pub fn decode(&mut self, record: RawRecord) -> Result<DecodedRecord> {
        if record.stream != self.stream {
            return Err(IngestionError::StreamMismatch {
                expected: self.stream,
                actual: record.stream,
            });
        }

        let sequence_index = record.sequence_index;
        let (timestamp, cross_clocks) = match &record.timestamp {
            None => {
                return Err(IngestionError::MissingTimestampRecord {
                    stream: self.stream,
                    sequence_index,
                });
            }
            Some(TimestampRecord::Counter(raw)) => {
                (self.reconciler.reconcile(*raw, sequence_index), Vec::new())
            }
            Some(TimestampRecord::Tsc(words)) => {
                let reading = decode_tsc(words)?;
                self.log_warnings(sequence_index, &reading.warnings);
                (reading.trigger, reading.cross_clocks)
            }
        };

        self.decoded += 1;
        let event = Event::new(self.stream, timestamp, sequence_index, record.payload)
            .with_clock(self.clock_frequency_mhz);

        Ok(DecodedRecord {
            event,
            cross_clocks,
        })
    }

    fn log_warnings(&self, sequence_index: u32, warnings: &[TscWarning]) {
        for warning in warnings {
            match warning {
                TscWarning::UnknownCounterVersion(version) => warn!(
                    stream = %self.stream,
                    sequence_index,
                    version = %format_args!("{version:#x}"),
                    "unknown TSC version"
                ),
                TscWarning::CounterOverflowFlag => warn!(
                    stream = %self.stream,
                    sequence_index,
                    "TSC counter in overflow condition"
                ),
                TscWarning::DuplicateTriggerMatch(value) => warn!(
                    stream = %self.stream,
                    sequence_index,
                    trigger = value,
                    "duplicate trigger timestamp in record (equivalent, keeping first)"
                ),
            }
            metrics::counter!("tscoinc_tsc_warnings_total", "stream" => self.stream.as_str())
                .increment(1);
        }
    }

    pub fn stream(&self) -> StreamType {
        self.stream
    }

    pub fn clock_frequency_mhz(&self) -> f64 {
        self.clock_frequency_mhz
    }

    /// Records decoded successfully
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    pub fn reconciler(&self) -> &TimestampReconciler {
        &self.reconciler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsc::{encode_tsc, TscRole, KNOWN_TSC_VERSIONS};
    use bytes::Bytes;

    #[test]
    fn test_invalid_frequency() {
        assert!(matches!(
            StreamDecoder::new(StreamType::Gamma, 0.0),
            Err(IngestionError::InvalidClockFrequency(_))
        ));
        assert!(StreamDecoder::new(StreamType::Gamma, -1.0).is_err());
        assert!(StreamDecoder::new(StreamType::Gamma, f64::NAN).is_err());
    }

    #[test]
    fn test_counter_record() {
        let mut decoder = StreamDecoder::new(StreamType::Gamma, 20.0).unwrap();
        let record = RawRecord::counter(StreamType::Gamma, 0, 400, Bytes::from_static(b"abc"));

        let decoded = decoder.decode(record).unwrap();
        assert_eq!(decoded.event.timestamp, 400);
        assert_eq!(decoded.event.trigger_time_us, Some(20.0));
        assert_eq!(decoded.event.payload, Bytes::from_static(b"abc"));
        assert!(decoded.cross_clocks.is_empty());
        assert_eq!(decoder.decoded(), 1);
    }

    #[test]
    fn test_counter_records_reconciled() {
        let mut decoder = StreamDecoder::new(StreamType::HeavyIon, 20.0).unwrap();
        let first = RawRecord::counter(StreamType::HeavyIon, 0, u32::MAX, Bytes::new());
        let second = RawRecord::counter(StreamType::HeavyIon, 1, 4, Bytes::new());

        decoder.decode(first).unwrap();
        let decoded = decoder.decode(second).unwrap();
        assert_eq!(decoded.event.timestamp, (1u64 << 32) + 4);
        assert_eq!(decoder.reconciler().rollover_count(), 1);
    }

    #[test]
    fn test_tsc_record() {
        let mut decoder = StreamDecoder::new(StreamType::HeavyIon, 10.0).unwrap();
        let words = encode_tsc(
            KNOWN_TSC_VERSIONS[2],
            false,
            &[(100, TscRole::Trigger), (99, TscRole::CrossClock)],
        );
        let record = RawRecord::tsc(StreamType::HeavyIon, 5, words, Bytes::new());

        let decoded = decoder.decode(record).unwrap();
        assert_eq!(decoded.event.timestamp, 100);
        assert_eq!(decoded.event.trigger_time_us, Some(10.0));
        assert_eq!(decoded.cross_clocks, vec![99]);
    }

    #[test]
    fn test_missing_timestamp() {
        let mut decoder = StreamDecoder::new(StreamType::Gamma, 20.0).unwrap();
        let record = RawRecord {
            stream: StreamType::Gamma,
            sequence_index: 3,
            timestamp: None,
            payload: Bytes::new(),
        };

        let err = decoder.decode(record).unwrap_err();
        assert!(matches!(
            err,
            IngestionError::MissingTimestampRecord {
                sequence_index: 3,
                ..
            }
        ));
        assert!(err.is_record_level());
        assert_eq!(decoder.decoded(), 0);
    }

    #[test]
    fn test_stream_mismatch() {
        let mut decoder = StreamDecoder::new(StreamType::Gamma, 20.0).unwrap();
        let record = RawRecord::counter(StreamType::HeavyIon, 0, 1, Bytes::new());
        let err = decoder.decode(record).unwrap_err();
        assert!(matches!(err, IngestionError::StreamMismatch { .. }));
        assert!(!err.is_record_level());
    }
}
