//! Pipeline orchestrator - coordinates all components.
//!
//! Records come from a replay file or the mock generator, flow through the
//! ingestion merge into the correlation engine, and the engine's output is
//! forwarded to the dispatcher with backpressure.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use coinc_engine::{CorrelationEngine, EngineError};
use contracts::{Emission, RawRecord, RunConfig};
use dispatcher::{CollectingSink, DispatchReport};
use ingestion::{
    DecodedRecord, IngestionConfig, IngestionPipeline, MergedStream, MockStreamConfig,
    MockStreamSource, RecordReplay,
};
use observability::{record_diagnostics, record_emission};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::PipelineStats;
use crate::error::{CliError, Result};

/// Where the two record streams come from
#[derive(Debug, Clone)]
pub enum InputSource {
    /// JSON Lines file written by `ingestion::write_records`
    Replay(PathBuf),
    /// Seeded synthetic streams
    Mock(MockStreamConfig),
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated run configuration
    pub run: RunConfig,

    /// Record source
    pub input: InputSource,

    /// Maximum number of merged records to process (None = unlimited)
    pub max_records: Option<u64>,

    /// Ingestion phase timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Channel buffer size
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

/// Engine plus the bookkeeping of the processing loop
struct Stage {
    engine: CorrelationEngine<CollectingSink>,
    emission_tx: mpsc::Sender<Emission>,
    /// Emissions taken from the engine but not yet accepted by the channel
    pending: VecDeque<Emission>,
    stats: PipelineStats,
}

impl Stage {
    /// Push one merged record and forward whatever the engine emitted
    async fn process(&mut self, record: DecodedRecord) -> Result<()> {
        let DecodedRecord {
            event,
            cross_clocks,
        } = record;

        self.stats.records_merged += 1;
        if !cross_clocks.is_empty() {
            self.stats.cross_clock_records += 1;
            self.engine
                .record_cross_clocks(event.stream, event.sequence_index, &cross_clocks);
        }

        match self.engine.push(event) {
            Ok(_) => {}
            Err(EngineError::CapacityExceeded { event, capacity }) => {
                debug!(
                    stream = %event.stream,
                    timestamp = event.timestamp,
                    capacity,
                    "event rejected by full buffer"
                );
            }
            Err(e) => return Err(e.into()),
        }

        if self.stats.records_merged.is_multiple_of(1000) {
            record_diagnostics(self.engine.diagnostics());
        }

        self.forward().await
    }

    /// Send collected emissions to the dispatcher, waiting when its queue is full
    ///
    /// Cancel safe: an emission leaves `pending` only once a channel slot is
    /// reserved for it, so a cancelled call resumes where it stopped.
    async fn forward(&mut self) -> Result<()> {
        let sink = self.engine.sink_mut();
        self.pending
            .extend(sink.take_cross_clocks().into_iter().map(Emission::Diagnostic));
        self.pending.extend(sink.take());

        while !self.pending.is_empty() {
            let permit = self
                .emission_tx
                .reserve()
                .await
                .map_err(|_| CliError::pipeline_execution("dispatcher channel closed"))?;
            if let Some(emission) = self.pending.pop_front() {
                record_emission(&emission);
                self.stats.emissions.update(&emission);
                permit.send(emission);
            }
        }
        Ok(())
    }
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline to completion
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let run = &self.config.run;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)
                .map_err(|e| CliError::pipeline_execution(e.to_string()))?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Ingestion
        let (gamma, heavy_ion) = self.load_records()?;
        let mut ingestion = IngestionPipeline::new(IngestionConfig::new(
            self.config.buffer_size,
            run.run.clock_frequency_mhz,
        ))?;
        ingestion.register_source(contracts::StreamType::Gamma, gamma)?;
        ingestion.register_source(contracts::StreamType::HeavyIon, heavy_ion)?;

        // Matcher
        let engine = CorrelationEngine::new(run.matching.clone(), CollectingSink::new())?;
        info!(
            coincidence_window = engine.coincidence_window(),
            max_window = engine.max_window(),
            capacity = run.matching.capacity,
            overflow_policy = ?run.matching.overflow_policy,
            "Correlation engine configured"
        );

        // Dispatcher
        let (emission_tx, emission_rx) = mpsc::channel(self.config.buffer_size.max(1));
        if run.sinks.is_empty() {
            warn!("No sinks configured - emissions are only counted");
        }
        let dispatcher = dispatcher::create_dispatcher(run.sinks.clone(), emission_rx)?;
        let dispatcher_handle = dispatcher.spawn();

        let mut stage = Stage {
            engine,
            emission_tx,
            pending: VecDeque::new(),
            stats: PipelineStats {
                active_sinks: run.sinks.len(),
                ..Default::default()
            },
        };

        let mut merged = ingestion.start()?;
        info!(max_records = ?self.config.max_records, "Pipeline running");

        let outcome = match self.config.timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.drive(&mut merged, &mut stage)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(timeout_secs = timeout.as_secs(), "Ingestion timed out");
                        Ok(())
                    }
                }
            }
            None => self.drive(&mut merged, &mut stage).await,
        };

        // Ingestion bookkeeping before the decoders are torn down
        stage.stats.out_of_order = merged.merger().out_of_order_count();
        let ingest = merged.metrics().snapshot();
        merged.shutdown().await;
        stage.stats.records_received = ingest.records_received;
        stage.stats.records_decoded = ingest.records_decoded;
        stage.stats.decode_errors = ingest.decode_errors;
        outcome?;

        // Drain the matcher
        info!(buffered = stage.engine.len(), "Flushing matcher");
        stage.stats.flush = stage.engine.flush(run.matching.flush_timeout());
        stage.forward().await?;
        stage.stats.diagnostics = stage.engine.diagnostics().clone();
        record_diagnostics(&stage.stats.diagnostics);

        // Closing the channel lets the dispatcher drain and stop
        let Stage {
            engine,
            emission_tx,
            mut stats,
            ..
        } = stage;
        drop(emission_tx);
        drop(engine.into_sink());

        stats.dispatch = match tokio::time::timeout(Duration::from_secs(30), dispatcher_handle).await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!(error = %e, "Dispatcher task failed");
                DispatchReport::default()
            }
            Err(_) => {
                warn!("Dispatcher did not finish within 30s");
                DispatchReport::default()
            }
        };
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            records = stats.records_merged,
            coincidences = stats.diagnostics.coincidences,
            singles = stats.diagnostics.total_singles(),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    async fn drive(&self, merged: &mut MergedStream, stage: &mut Stage) -> Result<()> {
        while let Some(record) = merged.next().await {
            stage.process(record).await?;

            if let Some(max) = self.config.max_records {
                if stage.stats.records_merged >= max {
                    info!(records = stage.stats.records_merged, "Reached max records limit");
                    stage.stats.truncated = true;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Read or generate both record streams
    fn load_records(&self) -> Result<(Vec<RawRecord>, Vec<RawRecord>)> {
        match &self.config.input {
            InputSource::Replay(path) => {
                if !path.exists() {
                    return Err(CliError::input_not_found(path));
                }
                info!(path = %path.display(), "Running in REPLAY mode");
                let batch = RecordReplay::open(path)?.read_all()?;
                if batch.skipped > 0 {
                    warn!(skipped = batch.skipped, "Replay lines skipped");
                }
                info!(
                    gamma = batch.gamma.len(),
                    heavy_ion = batch.heavy_ion.len(),
                    "Replay loaded"
                );
                Ok((batch.gamma, batch.heavy_ion))
            }
            InputSource::Mock(config) => {
                info!(
                    records = config.records,
                    seed = config.seed,
                    tsc = config.use_tsc,
                    "Running in MOCK mode"
                );
                let run = MockStreamSource::new(config.clone()).generate();
                info!(
                    gamma = run.gamma.len(),
                    heavy_ion = run.heavy_ion.len(),
                    planted = run.planted_coincidences,
                    "Mock streams generated"
                );
                Ok((run.gamma, run.heavy_ion))
            }
        }
    }
}
