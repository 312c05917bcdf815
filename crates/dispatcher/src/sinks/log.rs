//! LogSink - logs emission summary via tracing

use contracts::{ContractError, DataSink, Emission};
use tracing::{debug, info, instrument};

/// Sink that logs emission summaries for debugging
pub struct LogSink {
    name: String,
    coincidences: u64,
    singles: u64,
    diagnostics: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coincidences: 0,
            singles: 0,
            diagnostics: 0,
        }
    }

    fn log_emission_summary(&mut self, emission: &Emission) {
        match emission {
            Emission::Coincidence(pair) => {
                self.coincidences += 1;
                info!(
                    sink = %self.name,
                    gamma_ts = pair.gamma.timestamp,
                    gamma_seq = pair.gamma.sequence_index,
                    heavy_ion_ts = pair.heavy_ion.timestamp,
                    heavy_ion_seq = pair.heavy_ion.sequence_index,
                    dt = %pair.time_diff(),
                    "Coincidence"
                );
            }
            Emission::Single(event) => {
                self.singles += 1;
                debug!(
                    sink = %self.name,
                    stream = event.stream.as_str(),
                    timestamp = event.timestamp,
                    seq = event.sequence_index,
                    "Single"
                );
            }
            Emission::Diagnostic(record) => {
                self.diagnostics += 1;
                debug!(
                    sink = %self.name,
                    stream = record.stream.as_str(),
                    seq = record.sequence_index,
                    cross_clocks = ?record.cross_clocks,
                    "Cross-clock"
                );
            }
        }
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, emission),
        fields(sink = %self.name, kind = emission.kind())
    )]
    async fn write(&mut self, emission: &Emission) -> Result<(), ContractError> {
        self.log_emission_summary(emission);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            coincidences = self.coincidences,
            singles = self.singles,
            diagnostics = self.diagnostics,
            "LogSink closed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{Coincidence, CrossClockRecord, Event, StreamType};

    #[tokio::test]
    async fn test_log_sink_counts_by_kind() {
        let mut sink = LogSink::new("test_log");
        let gamma = Event::new(StreamType::Gamma, 100, 0, Bytes::new());
        let heavy = Event::new(StreamType::HeavyIon, 104, 0, Bytes::new());

        sink.write(&Emission::Single(gamma.clone())).await.unwrap();
        let pair = Coincidence::from_pair(gamma, heavy).unwrap();
        sink.write(&Emission::Coincidence(pair)).await.unwrap();
        sink.write(&Emission::Diagnostic(CrossClockRecord {
            stream: StreamType::Gamma,
            sequence_index: 0,
            cross_clocks: vec![50],
        }))
        .await
        .unwrap();

        assert_eq!(sink.singles, 1);
        assert_eq!(sink.coincidences, 1);
        assert_eq!(sink.diagnostics, 1);
        assert!(sink.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_log_sink_name() {
        let sink = LogSink::new("my_logger");
        assert_eq!(sink.name(), "my_logger");
    }
}
