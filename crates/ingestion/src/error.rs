//! Ingestion 错误类型

use contracts::StreamType;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 记录缺少时间戳
    #[error("{stream} record {sequence_index} has no timestamp")]
    MissingTimestampRecord {
        /// 数据流
        stream: StreamType,
        /// 记录序号
        sequence_index: u32,
    },

    /// TSC 记录长度不足
    #[error("truncated timestamp record: {message}")]
    TruncatedTimestampRecord {
        /// 错误消息
        message: String,
    },

    /// 同一记录中出现两个不同的触发时间戳
    #[error("conflicting trigger timestamps {first} and {second} in one record")]
    DuplicateTriggerMismatch {
        /// 首个触发时间戳
        first: u64,
        /// 冲突的触发时间戳
        second: u64,
    },

    /// TSC 记录中没有触发时间戳
    #[error("timestamp record carries no trigger timestamp")]
    MissingTriggerTimestamp,

    /// 时钟频率非法
    #[error("invalid clock frequency {0} MHz (must be finite and > 0)")]
    InvalidClockFrequency(f64),

    /// 解码器收到其他数据流的记录
    #[error("decoder for {expected} received a {actual} record")]
    StreamMismatch {
        /// 解码器所属数据流
        expected: StreamType,
        /// 记录所属数据流
        actual: StreamType,
    },

    /// 回放文件解析失败
    #[error("failed to parse record at line {line}: {message}")]
    ParseFailed {
        /// 行号 (从 1 开始)
        line: usize,
        /// 错误消息
        message: String,
    },

    /// 数据流已注册数据源
    #[error("stream {stream} already has a record source")]
    AlreadyRegistered {
        /// 数据流
        stream: StreamType,
    },

    /// 通道已关闭
    #[error("channel closed for stream {stream}")]
    ChannelClosed {
        /// 数据流
        stream: StreamType,
    },

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestionError {
    /// 是否只影响当前记录 (管线可继续)
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            IngestionError::MissingTimestampRecord { .. }
                | IngestionError::TruncatedTimestampRecord { .. }
                | IngestionError::DuplicateTriggerMismatch { .. }
                | IngestionError::MissingTriggerTimestamp
                | IngestionError::ParseFailed { .. }
        )
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
