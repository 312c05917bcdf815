//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend only on this crate, never on each other's internals.
//!
//! ## Time Model
//! - Trigger clock ticks (`u64`) are the primary time base
//! - Raw 32-bit counters wrap and are reconciled per stream before matching
//! - `trigger_time_us` is derived from ticks and the run's clock frequency

mod config;
mod diagnostics;
mod error;
mod event;
mod sink;

pub use config::*;
pub use diagnostics::QueueDiagnostics;
pub use error::*;
pub use event::*;
pub use sink::*;
