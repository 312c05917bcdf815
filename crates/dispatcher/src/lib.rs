//! # Dispatcher
//!
//! 输出分发模块。
//!
//! 负责：
//! - 将匹配器的同步回调转换为有界队列 (`ChannelSink`)
//! - 消费 `Emission` 并 fan-out 到多个 sinks
//! - 隔离慢 sink，不阻塞匹配主链路

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{CrossClockRecord, DataSink, Emission, OutputSink};
pub use dispatcher::{
    DispatchReport, Dispatcher, DispatcherBuilder, DispatcherConfig, create_dispatcher,
};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{ChannelSink, CollectingSink, JsonLinesSink, JsonLinesSinkConfig, LogSink};
