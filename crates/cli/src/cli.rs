//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tscoinc - two-stream timestamp coincidence matcher
#[derive(Parser, Debug)]
#[command(
    name = "tscoinc",
    author,
    version,
    about = "Gamma / heavy-ion trigger coincidence matcher",
    long_about = "Pairs events from a gamma-detector stream and a heavy-ion-detector stream\n\
                  whose trigger timestamps lie within a coincidence window, and emits\n\
                  everything else as singles once its retention window expires."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TSCOINC_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TSCOINC_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the coincidence matcher over recorded or generated streams
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "run.toml", env = "TSCOINC_CONFIG")]
    pub config: PathBuf,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Seed for generated streams
    #[arg(long, default_value = "24301", env = "TSCOINC_MOCK_SEED")]
    pub seed: u64,

    /// Generate TSC word lists instead of 32-bit counters
    #[arg(long, requires = "mock")]
    pub tsc: bool,

    /// Stop after this many merged records (0 = unlimited)
    #[arg(long, default_value = "0", env = "TSCOINC_MAX_RECORDS")]
    pub max_records: u64,

    /// Wall-clock limit for the ingestion phase in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "TSCOINC_TIMEOUT")]
    pub timeout: u64,

    /// Override the coincidence window (ticks)
    #[arg(long)]
    pub coincidence_window: Option<u64>,

    /// Override the retention window (ticks)
    #[arg(long)]
    pub max_window: Option<u64>,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size for internal queues
    #[arg(long, default_value = "1024", env = "TSCOINC_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TSCOINC_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Where records come from
#[derive(Args, Debug, Clone)]
#[group(required = false, multiple = false)]
pub struct SourceArgs {
    /// Replay records from a JSON Lines file
    #[arg(short, long, env = "TSCOINC_INPUT")]
    pub input: Option<PathBuf>,

    /// Generate this many gamma events (plus partners and heavy-ion singles)
    #[arg(long)]
    pub mock: Option<usize>,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "run.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "run.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
