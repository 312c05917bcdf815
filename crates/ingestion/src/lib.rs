//! # Ingestion Pipeline
//!
//! Trigger stream ingestion module.
//!
//! Responsibilities:
//! - Reconcile wrapping 32-bit trigger counters per stream
//! - Decode timestamp-counter (TSC) word lists
//! - Turn `RawRecord`s into `Event`s
//! - Merge both streams into one time-ordered sequence
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{IngestionConfig, IngestionPipeline, MockStreamSource};
//! use contracts::StreamType;
//!
//! let run = MockStreamSource::with_records(1000, 42).generate();
//!
//! let mut pipeline = IngestionPipeline::new(IngestionConfig::new(1024, 20.0))?;
//! pipeline.register_source(StreamType::Gamma, run.gamma)?;
//! pipeline.register_source(StreamType::HeavyIon, run.heavy_ion)?;
//!
//! let mut merged = pipeline.start()?;
//! while let Some(record) = merged.next().await {
//!     // Push record.event into the correlation engine
//! }
//! ```

mod config;
mod decoder;
mod error;
mod merge;
mod mock;
mod pipeline;
mod reconciler;
mod replay;
mod tsc;

// Re-exports
pub use config::{IngestionConfig, IngestionMetrics, MetricsSnapshot};
pub use contracts::{Event, RawRecord, TimestampRecord};
pub use decoder::{DecodedRecord, StreamDecoder};
pub use error::{IngestionError, Result};
pub use merge::StreamMerger;
pub use mock::{MockRun, MockStreamConfig, MockStreamSource};
pub use pipeline::{IngestionPipeline, MergedStream};
pub use reconciler::TimestampReconciler;
pub use replay::{write_records, RecordReplay, ReplayBatch};
pub use tsc::{
    decode_tsc, encode_tsc, pack_pair, unpack_pair, TscReading, TscRole, TscWarning,
    KNOWN_TSC_VERSIONS,
};
