//! Ingestion configuration and metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Ingestion configuration
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Per-stream channel capacity
    pub channel_capacity: usize,

    /// Trigger clock frequency (MHz)
    pub clock_frequency_mhz: f64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            clock_frequency_mhz: 20.0,
        }
    }
}

impl IngestionConfig {
    /// Create new ingestion configuration
    pub fn new(channel_capacity: usize, clock_frequency_mhz: f64) -> Self {
        Self {
            channel_capacity,
            clock_frequency_mhz,
        }
    }
}

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total records received from sources
    pub records_received: AtomicU64,

    /// Records decoded into events
    pub records_decoded: AtomicU64,

    /// Records rejected by the decoder
    pub decode_errors: AtomicU64,

    /// Records released by the merge
    pub records_merged: AtomicU64,

    /// Current merge queue length
    pub queue_len: AtomicUsize,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a received raw record
    pub fn record_received(&self) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decoded record
    pub fn record_decoded(&self) {
        self.records_decoded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record decode error
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a merged record
    pub fn record_merged(&self) {
        self.records_merged.fetch_add(1, Ordering::Relaxed);
    }

    /// Update queue length
    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            records_decoded: self.records_decoded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            records_merged: self.records_merged.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total records received from sources
    pub records_received: u64,

    /// Records decoded into events
    pub records_decoded: u64,

    /// Records rejected by the decoder
    pub decode_errors: u64,

    /// Records released by the merge
    pub records_merged: u64,

    /// Current merge queue length
    pub queue_len: usize,
}
