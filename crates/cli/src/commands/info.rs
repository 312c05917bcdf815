//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::RunConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    clock: ClockInfo,
    matching: MatchingInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct ClockInfo {
    frequency_mhz: f64,
    tick_ns: f64,
}

#[derive(Serialize)]
struct MatchingInfo {
    coincidence_window: u64,
    coincidence_window_us: f64,
    max_window: u64,
    max_window_us: f64,
    capacity: usize,
    overflow_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    flush_timeout_secs: Option<u64>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    params: std::collections::HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn ticks_to_us(ticks: u64, frequency_mhz: f64) -> f64 {
    ticks as f64 / frequency_mhz
}

fn build_config_info(config: &RunConfig, args: &InfoArgs) -> ConfigInfo {
    let freq = config.run.clock_frequency_mhz;
    let matching = &config.matching;

    let sinks = if args.sinks {
        config
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", config.version),
        clock: ClockInfo {
            frequency_mhz: freq,
            tick_ns: 1000.0 / freq,
        },
        matching: MatchingInfo {
            coincidence_window: matching.coincidence_window,
            coincidence_window_us: ticks_to_us(matching.coincidence_window, freq),
            max_window: matching.max_window,
            max_window_us: ticks_to_us(matching.max_window, freq),
            capacity: matching.capacity,
            overflow_policy: format!("{:?}", matching.overflow_policy),
            flush_timeout_secs: matching.flush_timeout().map(|d| d.as_secs()),
        },
        sinks,
    }
}

fn print_config_info(config: &RunConfig, args: &InfoArgs) {
    let freq = config.run.clock_frequency_mhz;
    let matching = &config.matching;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               tscoinc Run Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⏱  Clock");
    println!("   ├─ Version: {:?}", config.version);
    println!("   ├─ Frequency: {} MHz", freq);
    println!("   └─ Tick: {:.3} ns", 1000.0 / freq);

    println!("\n⚙️  Matching");
    println!(
        "   ├─ Coincidence window: {} ticks ({:.3} µs)",
        matching.coincidence_window,
        ticks_to_us(matching.coincidence_window, freq)
    );
    println!(
        "   ├─ Max window: {} ticks ({:.3} µs)",
        matching.max_window,
        ticks_to_us(matching.max_window, freq)
    );
    println!("   ├─ Capacity: {} events", matching.capacity);
    println!("   ├─ Overflow policy: {:?}", matching.overflow_policy);
    match matching.flush_timeout() {
        Some(timeout) => println!("   └─ Flush timeout: {}s", timeout.as_secs()),
        None => println!("   └─ Flush timeout: unlimited"),
    }

    if config.sinks.is_empty() {
        println!("\n📤 Sinks: none");
    } else if args.sinks {
        println!("\n📤 Sinks ({})", config.sinks.len());
        for (i, sink) in config.sinks.iter().enumerate() {
            let is_last = i == config.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            println!(
                "   {} {} ({:?}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    } else {
        println!("\n📤 Sinks: {} (use --sinks for details)", config.sinks.len());
    }

    println!();
}
