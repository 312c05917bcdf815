//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::RunConfig;
use ingestion::MockStreamConfig;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{InputSource, Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .map_err(CliError::from)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut config, args)?;

    info!(
        clock_mhz = config.run.clock_frequency_mhz,
        coincidence_window = config.matching.coincidence_window,
        max_window = config.matching.max_window,
        sinks = config.sinks.len(),
        "Configuration loaded"
    );

    let input = input_source(args);

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config, &input);
        return Ok(());
    }

    let clock_frequency_mhz = config.run.clock_frequency_mhz;
    let pipeline_config = PipelineConfig {
        run: config,
        input,
        max_records: (args.max_records > 0).then_some(args.max_records),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    let pipeline = Pipeline::new(pipeline_config);
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting pipeline...");

    tokio::select! {
        result = pipeline.run() => {
            let stats = result.context("Pipeline execution failed")?;
            info!(
                records = stats.records_merged,
                coincidences = stats.diagnostics.coincidences,
                singles = stats.diagnostics.total_singles(),
                duration_secs = stats.duration.as_secs_f64(),
                "Pipeline completed successfully"
            );
            stats.print_summary(clock_frequency_mhz);
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping pipeline...");
        }
    }

    info!("tscoinc finished");
    Ok(())
}

/// Apply command-line window overrides and re-validate
fn apply_overrides(config: &mut RunConfig, args: &RunArgs) -> Result<()> {
    if let Some(window) = args.coincidence_window {
        info!(window, "Overriding coincidence window from CLI");
        config.matching.coincidence_window = window;
    }
    if let Some(max_window) = args.max_window {
        info!(max_window, "Overriding max window from CLI");
        config.matching.max_window = max_window;
    }
    if args.coincidence_window.is_some() || args.max_window.is_some() {
        config_loader::ConfigLoader::validate(config)
            .map_err(CliError::from)
            .context("Invalid window override")?;
    }
    Ok(())
}

fn input_source(args: &RunArgs) -> InputSource {
    match (&args.source.input, args.source.mock) {
        (Some(path), _) => InputSource::Replay(path.clone()),
        (None, records) => InputSource::Mock(MockStreamConfig {
            records: records.unwrap_or(MockStreamConfig::default().records),
            use_tsc: args.tsc,
            seed: args.seed,
            ..Default::default()
        }),
    }
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &RunConfig, input: &InputSource) {
    println!("\n=== Configuration Summary ===\n");
    println!("Run:");
    println!("  Clock: {} MHz", config.run.clock_frequency_mhz);
    println!("\nMatching:");
    println!("  Coincidence window: {} ticks", config.matching.coincidence_window);
    println!("  Max window: {} ticks", config.matching.max_window);
    println!("  Capacity: {}", config.matching.capacity);
    println!("  Overflow policy: {:?}", config.matching.overflow_policy);

    println!("\nInput:");
    match input {
        InputSource::Replay(path) => println!("  Replay: {}", path.display()),
        InputSource::Mock(mock) => println!(
            "  Mock: {} gamma events, seed {}{}",
            mock.records,
            mock.seed,
            if mock.use_tsc { ", TSC records" } else { "" }
        ),
    }

    if !config.sinks.is_empty() {
        println!("\nSinks ({}):", config.sinks.len());
        for sink in &config.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
