//! Dispatcher - main loop for fan-out to sinks

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{Emission, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{JsonLinesSink, LogSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink configurations
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<Emission>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<Emission>) -> Self {
        Self { config, input_rx }
    }

    /// Build the dispatcher and spawn one worker per sink
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let handles = Self::initialize_handles(&self.config)?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(config),
        fields(sink_count = config.sinks.len())
    )]
    fn initialize_handles(config: &DispatcherConfig) -> Result<Vec<SinkHandle>, DispatcherError> {
        let mut handles = Vec::with_capacity(config.sinks.len());
        for sink_config in &config.sinks {
            handles.push(create_sink_handle(sink_config)?);
        }
        Ok(handles)
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::JsonLines => {
            let sink = JsonLinesSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// Totals reported when the dispatcher stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Emissions received from the matcher
    pub received: u64,
    /// Coincidences among them
    pub coincidences: u64,
    /// Singles among them
    pub singles: u64,
    /// Cross-clock diagnostics among them
    pub diagnostics: u64,
    /// Final per-sink metrics
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

/// The main Dispatcher that fans out emissions to sinks
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<Emission>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<Emission>) -> Self {
        Self { handles, input_rx }
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run the dispatcher main loop
    ///
    /// Consumes emissions from input and fans out to all sinks.
    /// Returns when input channel is closed and every sink has drained.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> DispatchReport {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut report = DispatchReport::default();

        while let Some(emission) = self.input_rx.recv().await {
            report.received += 1;
            match &emission {
                Emission::Coincidence(_) => report.coincidences += 1,
                Emission::Single(_) => report.singles += 1,
                Emission::Diagnostic(_) => report.diagnostics += 1,
            }
            self.dispatch(emission);

            if report.received.is_multiple_of(10_000) {
                debug!(emissions = report.received, "Dispatcher progress");
            }
        }

        info!(
            emissions = report.received,
            coincidences = report.coincidences,
            singles = report.singles,
            diagnostics = report.diagnostics,
            "Dispatcher input closed, shutting down"
        );

        let handles = std::mem::take(&mut self.handles);
        let metrics: Vec<_> = handles
            .iter()
            .map(|h| (h.name().to_string(), std::sync::Arc::clone(h.metrics())))
            .collect();
        Self::shutdown_handles(handles).await;
        report.sinks = metrics
            .into_iter()
            .map(|(name, m)| (name, m.snapshot()))
            .collect();

        info!("Dispatcher shutdown complete");
        report
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<DispatchReport> {
        tokio::spawn(self.run())
    }

    fn dispatch(&self, emission: Emission) {
        // Last handle takes ownership, the rest get clones
        if let Some((last, rest)) = self.handles.split_last() {
            for handle in rest {
                handle.try_send(emission.clone());
            }
            last.try_send(emission);
        }
    }

    async fn shutdown_handles(handles: Vec<SinkHandle>) {
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<Emission>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{Coincidence, Event, StreamType};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn single(timestamp: u64) -> Emission {
        Emission::Single(Event::new(StreamType::Gamma, timestamp, 0, Bytes::new()))
    }

    #[tokio::test]
    async fn test_dispatcher_fanout() {
        let (input_tx, input_rx) = mpsc::channel(10);

        let handles = vec![
            SinkHandle::spawn(LogSink::new("sink1"), 10),
            SinkHandle::spawn(LogSink::new("sink2"), 10),
        ];

        let dispatcher = Dispatcher::with_handles(handles, input_rx);
        let handle = dispatcher.spawn();

        for i in 0..5 {
            input_tx.send(single(i)).await.unwrap();
        }
        drop(input_tx);

        let report = handle.await.unwrap();
        assert_eq!(report.received, 5);
        assert_eq!(report.singles, 5);
        assert_eq!(report.sinks.len(), 2);
        for (_, snapshot) in &report.sinks {
            assert_eq!(snapshot.write_count, 5);
        }
    }

    #[tokio::test]
    async fn test_create_dispatcher_from_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emissions.jsonl");
        let (input_tx, input_rx) = mpsc::channel(10);

        let configs = vec![
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 50,
                params: HashMap::new(),
            },
            SinkConfig {
                name: "jsonl".to_string(),
                sink_type: SinkType::JsonLines,
                queue_capacity: 50,
                params: HashMap::from([("path".to_string(), path.display().to_string())]),
            },
        ];

        let dispatcher = create_dispatcher(configs, input_rx).unwrap();
        let handle = dispatcher.spawn();

        let pair = Coincidence::from_pair(
            Event::new(StreamType::Gamma, 100, 1, Bytes::new()),
            Event::new(StreamType::HeavyIon, 103, 1, Bytes::new()),
        )
        .unwrap();
        input_tx.send(Emission::Coincidence(pair)).await.unwrap();
        input_tx.send(single(500)).await.unwrap();
        drop(input_tx);

        let report = handle.await.unwrap();
        assert_eq!(report.coincidences, 1);
        assert_eq!(report.singles, 1);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_json_lines_without_path_fails() {
        let (_tx, rx) = mpsc::channel(1);
        let configs = vec![SinkConfig {
            name: "broken".to_string(),
            sink_type: SinkType::JsonLines,
            queue_capacity: 8,
            params: HashMap::new(),
        }];

        let err = create_dispatcher(configs, rx).err().unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { .. }));
    }
}
