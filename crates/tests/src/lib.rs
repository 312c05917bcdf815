//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（Mock 流 -> Ingestion -> 匹配器 -> Dispatcher）
//! - 回放与计数器回绕的一致性

#[cfg(test)]
mod contract_tests {
    use std::io::Write;

    use bytes::Bytes;
    use contracts::{Coincidence, Emission, Event, OverflowPolicy, SinkType, StreamType};

    #[test]
    fn test_emission_json_shape() {
        let pair = Coincidence::from_pair(
            Event::new(StreamType::HeavyIon, 105, 2, Bytes::new()),
            Event::new(StreamType::Gamma, 100, 1, Bytes::new()),
        )
        .unwrap();
        let value = serde_json::to_value(Emission::Coincidence(pair)).unwrap();

        assert_eq!(value["kind"], "coincidence");
        assert_eq!(value["gamma"]["timestamp"], 100);
        assert_eq!(value["heavy_ion"]["timestamp"], 105);
        assert_eq!(value["gamma"]["stream"], serde_json::to_value(StreamType::Gamma).unwrap());
    }

    #[test]
    fn test_run_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[run]
clock_frequency_mhz = 20.0

[matching]
coincidence_window = 8
max_window = 2000
capacity = 64
overflow_policy = "reject"
flush_timeout_secs = 3

[[sinks]]
name = "out"
sink_type = "json_lines"
params = {{ path = "out.jsonl" }}
"#
        )
        .unwrap();

        let config = config_loader::ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(config.matching.coincidence_window, 8);
        assert_eq!(config.matching.capacity, 64);
        assert_eq!(config.matching.overflow_policy, OverflowPolicy::Reject);
        assert_eq!(config.matching.flush_timeout().map(|d| d.as_secs()), Some(3));
        assert_eq!(config.sinks[0].sink_type, SinkType::JsonLines);
        assert_eq!(config.sinks[0].queue_capacity, 1024);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;

    use coinc_engine::CorrelationEngine;
    use contracts::{Emission, MatchingConfig, QueueDiagnostics, RawRecord, SinkConfig, SinkType, StreamType};
    use dispatcher::{create_dispatcher, ChannelSink, CollectingSink};
    use ingestion::{
        write_records, IngestionConfig, IngestionPipeline, MockStreamConfig, MockStreamSource,
        RecordReplay,
    };
    use observability::EmissionAggregator;

    const CLOCK_MHZ: f64 = 20.0;

    fn matching() -> MatchingConfig {
        MatchingConfig::with_windows(10, 20_000)
    }

    /// Ingest both streams and run them through the matcher
    async fn run_matcher(
        gamma: Vec<RawRecord>,
        heavy_ion: Vec<RawRecord>,
        config: MatchingConfig,
    ) -> (Vec<Emission>, QueueDiagnostics) {
        let mut pipeline =
            IngestionPipeline::new(IngestionConfig::new(64, CLOCK_MHZ)).unwrap();
        pipeline.register_source(StreamType::Gamma, gamma).unwrap();
        pipeline.register_source(StreamType::HeavyIon, heavy_ion).unwrap();

        let mut engine = CorrelationEngine::new(config, CollectingSink::new()).unwrap();
        let mut merged = pipeline.start().unwrap();
        while let Some(record) = merged.next().await {
            engine.record_cross_clocks(
                record.event.stream,
                record.event.sequence_index,
                &record.cross_clocks,
            );
            engine.push(record.event).unwrap();
        }
        merged.shutdown().await;

        engine.cleanup();
        let diagnostics = engine.diagnostics().clone();
        let mut sink = engine.into_sink();
        (sink.take(), diagnostics)
    }

    fn coincidence_keys(emissions: &[Emission]) -> Vec<(u64, u64)> {
        let mut keys: Vec<_> = emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Coincidence(pair) => {
                    Some((pair.gamma.timestamp, pair.heavy_ion.timestamp))
                }
                _ => None,
            })
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Every generated record leaves the matcher exactly once
    #[tokio::test]
    async fn test_e2e_mock_no_loss() {
        let run = MockStreamSource::with_records(2_000, 11).generate();
        let total = run.total_records() as u64;

        let (emissions, diagnostics) = run_matcher(run.gamma, run.heavy_ion, matching()).await;

        let mut aggregator = EmissionAggregator::new();
        for emission in &emissions {
            aggregator.update(emission);
        }

        assert_eq!(diagnostics.pushed, total);
        assert_eq!(diagnostics.duplicates, 0);
        assert_eq!(aggregator.total_events(), total);
        assert_eq!(diagnostics.emitted_events(), total);
        assert!(diagnostics.coincidences > 0);

        // Matched pairs are always closer than the window
        for emission in &emissions {
            if let Emission::Coincidence(pair) = emission {
                assert!(pair.time_diff().unsigned_abs() < 10);
                assert_eq!(pair.gamma.stream, StreamType::Gamma);
                assert_eq!(pair.heavy_ion.stream, StreamType::HeavyIon);
            }
        }
    }

    /// Counter records crossing 2^32 pair the same way as wide TSC records
    #[tokio::test]
    async fn test_counter_rollover_matches_tsc() {
        let base = MockStreamConfig {
            records: 800,
            start_counter: u32::MAX - 100_000,
            seed: 3,
            ..Default::default()
        };
        let counter_run = MockStreamSource::new(base.clone()).generate();
        let tsc_run = MockStreamSource::new(MockStreamConfig {
            use_tsc: true,
            ..base
        })
        .generate();

        let (counter_out, counter_diag) =
            run_matcher(counter_run.gamma, counter_run.heavy_ion, matching()).await;
        let (tsc_out, tsc_diag) = run_matcher(tsc_run.gamma, tsc_run.heavy_ion, matching()).await;

        assert!(counter_diag.last_timestamp.unwrap() > u64::from(u32::MAX));
        assert_eq!(counter_diag.coincidences, tsc_diag.coincidences);
        assert_eq!(counter_diag.singles, tsc_diag.singles);
        assert_eq!(coincidence_keys(&counter_out), coincidence_keys(&tsc_out));
    }

    /// TSC cross-clock values reach the sink as diagnostics
    #[tokio::test]
    async fn test_tsc_cross_clocks_forwarded() {
        let run = MockStreamSource::new(MockStreamConfig {
            records: 50,
            use_tsc: true,
            seed: 5,
            ..Default::default()
        })
        .generate();
        let total = run.total_records();

        let mut pipeline =
            IngestionPipeline::new(IngestionConfig::new(16, CLOCK_MHZ)).unwrap();
        pipeline.register_source(StreamType::Gamma, run.gamma).unwrap();
        pipeline.register_source(StreamType::HeavyIon, run.heavy_ion).unwrap();

        let mut engine = CorrelationEngine::new(matching(), CollectingSink::new()).unwrap();
        let mut merged = pipeline.start().unwrap();
        while let Some(record) = merged.next().await {
            let trigger = record.event.timestamp;
            assert_eq!(record.cross_clocks, vec![trigger / 2]);
            assert!(record.event.trigger_time_us.is_some());
            engine.record_cross_clocks(
                record.event.stream,
                record.event.sequence_index,
                &record.cross_clocks,
            );
            engine.push(record.event).unwrap();
        }
        engine.cleanup();

        assert_eq!(engine.sink().cross_clocks().len(), total);
    }

    /// A recorded run replays to identical matcher output
    #[tokio::test]
    async fn test_replay_file_reproduces_run() {
        let run = MockStreamSource::with_records(500, 21).generate();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let file = std::fs::File::create(&path).unwrap();
        let written = write_records(
            std::io::BufWriter::new(file),
            run.gamma.iter().chain(run.heavy_ion.iter()),
        )
        .unwrap();
        assert_eq!(written, run.total_records());

        let batch = RecordReplay::open(&path).unwrap().read_all().unwrap();
        assert_eq!(batch.skipped, 0);
        assert_eq!(batch.gamma.len(), run.gamma.len());

        let (direct, direct_diag) =
            run_matcher(run.gamma.clone(), run.heavy_ion.clone(), matching()).await;
        let (replayed, replay_diag) = run_matcher(batch.gamma, batch.heavy_ion, matching()).await;

        assert_eq!(direct_diag, replay_diag);
        assert_eq!(direct, replayed);
    }

    /// Malformed records are skipped without stopping the stream
    #[tokio::test]
    async fn test_bad_records_are_skipped() {
        let gamma = vec![
            RawRecord::counter(StreamType::Gamma, 0, 100, bytes::Bytes::new()),
            RawRecord::tsc(StreamType::Gamma, 1, vec![0x0112_0809, 0, 0], bytes::Bytes::new()),
            RawRecord {
                stream: StreamType::Gamma,
                sequence_index: 2,
                timestamp: None,
                payload: bytes::Bytes::new(),
            },
            RawRecord::counter(StreamType::Gamma, 3, 500, bytes::Bytes::new()),
        ];
        let heavy_ion = vec![RawRecord::counter(
            StreamType::HeavyIon,
            0,
            503,
            bytes::Bytes::new(),
        )];

        let (emissions, diagnostics) = run_matcher(gamma, heavy_ion, matching()).await;

        assert_eq!(diagnostics.pushed, 3);
        assert_eq!(diagnostics.coincidences, 1);
        assert_eq!(diagnostics.singles_for(StreamType::Gamma), 1);
        assert_eq!(emissions.len(), 2);
    }

    /// Mock streams -> ingestion -> ChannelSink -> Dispatcher -> JSON Lines
    #[tokio::test]
    async fn test_e2e_dispatch_to_json_lines() {
        let run = MockStreamSource::with_records(300, 17).generate();
        let total = run.total_records();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("emissions.jsonl");
        let sinks = vec![
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: total + 1,
                params: HashMap::new(),
            },
            SinkConfig {
                name: "jsonl".to_string(),
                sink_type: SinkType::JsonLines,
                queue_capacity: total + 1,
                params: HashMap::from([("path".to_string(), out.display().to_string())]),
            },
        ];

        // Channel large enough that try_send never drops
        let (sink, rx) = ChannelSink::channel(total + 1);
        let dispatcher = create_dispatcher(sinks, rx).unwrap();
        assert_eq!(dispatcher.metrics().len(), 2);
        let dispatcher_handle = dispatcher.spawn();

        let mut pipeline =
            IngestionPipeline::new(IngestionConfig::new(32, CLOCK_MHZ)).unwrap();
        pipeline.register_source(StreamType::Gamma, run.gamma).unwrap();
        pipeline.register_source(StreamType::HeavyIon, run.heavy_ion).unwrap();

        let mut engine = CorrelationEngine::new(matching(), sink).unwrap();
        let mut merged = pipeline.start().unwrap();
        while let Some(record) = merged.next().await {
            engine.push(record.event).unwrap();
        }
        engine.cleanup();

        let diagnostics = engine.diagnostics().clone();
        let sink = engine.into_sink();
        assert_eq!(sink.dropped(), 0);
        drop(sink);

        let report = tokio::time::timeout(std::time::Duration::from_secs(10), dispatcher_handle)
            .await
            .expect("dispatcher timed out")
            .unwrap();

        assert_eq!(report.coincidences, diagnostics.coincidences);
        assert_eq!(report.singles, diagnostics.total_singles());

        let events: u64 = std::fs::read_to_string(&out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<Emission>(line).unwrap().event_count() as u64)
            .sum();
        assert_eq!(events, total as u64);
    }

    /// TSC cross-clock values are written next to the matcher output
    #[tokio::test]
    async fn test_e2e_cross_clocks_reach_json_lines() {
        let run = MockStreamSource::new(MockStreamConfig {
            records: 80,
            use_tsc: true,
            seed: 23,
            ..Default::default()
        })
        .generate();
        let total = run.total_records();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tsc.jsonl");
        let sinks = vec![SinkConfig {
            name: "jsonl".to_string(),
            sink_type: SinkType::JsonLines,
            queue_capacity: 2 * total + 1,
            params: HashMap::from([("path".to_string(), out.display().to_string())]),
        }];

        let (sink, rx) = ChannelSink::channel(2 * total + 1);
        let dispatcher_handle = create_dispatcher(sinks, rx).unwrap().spawn();

        let mut pipeline =
            IngestionPipeline::new(IngestionConfig::new(16, CLOCK_MHZ)).unwrap();
        pipeline.register_source(StreamType::Gamma, run.gamma).unwrap();
        pipeline.register_source(StreamType::HeavyIon, run.heavy_ion).unwrap();

        let mut engine = CorrelationEngine::new(matching(), sink).unwrap();
        let mut merged = pipeline.start().unwrap();
        while let Some(record) = merged.next().await {
            engine.record_cross_clocks(
                record.event.stream,
                record.event.sequence_index,
                &record.cross_clocks,
            );
            engine.push(record.event).unwrap();
        }
        merged.shutdown().await;
        engine.cleanup();

        let sink = engine.into_sink();
        assert_eq!(sink.dropped(), 0);
        assert_eq!(sink.diagnostics(), total as u64);
        drop(sink);

        let report = tokio::time::timeout(std::time::Duration::from_secs(10), dispatcher_handle)
            .await
            .expect("dispatcher timed out")
            .unwrap();
        assert_eq!(report.diagnostics, total as u64);

        let emissions: Vec<Emission> = std::fs::read_to_string(&out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let cross_clocks: Vec<_> = emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Diagnostic(record) => Some(record),
                _ => None,
            })
            .collect();
        assert_eq!(cross_clocks.len(), total);
        assert!(cross_clocks.iter().all(|r| r.cross_clocks.len() == 1));

        let events: usize = emissions.iter().map(Emission::event_count).sum();
        assert_eq!(events, total);
    }
}
