//! Sink implementations
//!
//! Async writers (`LogSink`, `JsonLinesSink`) run behind a `SinkHandle`;
//! `ChannelSink` and `CollectingSink` are synchronous `OutputSink`s for the matcher.

mod channel;
mod json_lines;
mod log;

pub use self::channel::{ChannelSink, CollectingSink};
pub use self::json_lines::{JsonLinesSink, JsonLinesSinkConfig};
pub use self::log::LogSink;
