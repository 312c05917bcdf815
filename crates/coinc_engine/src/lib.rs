//! # Coincidence Engine
//!
//! Two-stream timestamp coincidence matcher.
//!
//! Responsibilities:
//! - keep unmatched events ordered by trigger time
//! - pair gamma / heavy-ion events closer than the coincidence window
//! - release expired events as singles once the buffered span exceeds `max_window`
//! - bound memory with a hard element ceiling
//!
//! ## Example
//!
//! ```ignore
//! use coinc_engine::{CorrelationEngine, MatchingConfig};
//!
//! let mut engine = CorrelationEngine::new(MatchingConfig::with_windows(10, 4_000_000), sink)?;
//!
//! // Push events as they arrive (non-decreasing per stream)
//! engine.push(event)?;
//!
//! // End of run: release everything still buffered
//! engine.cleanup();
//! ```

mod buffer;
mod engine;
mod policy;

pub use buffer::{BufferError, EventHandle, Iter, OrderedEventBuffer};
pub use engine::{CorrelationEngine, EngineError, FlushReport, PushOutcome};
pub use policy::MatchPolicy;

// Re-export contracts types
pub use contracts::{
    Coincidence, Event, MatchingConfig, OutputSink, OverflowPolicy, QueueDiagnostics, StreamType,
};
