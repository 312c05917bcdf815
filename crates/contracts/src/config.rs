//! RunConfig - Config Loader output
//!
//! Per-run settings: clock metadata, matching windows, buffer bounds and
//! output routing.

use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Run metadata
    #[validate(nested)]
    pub run: RunSettings,

    /// Coincidence matching settings
    #[serde(default)]
    #[validate(nested)]
    pub matching: MatchingConfig,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Metadata read once at the start of a run
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunSettings {
    /// Trigger clock frequency in MHz (must be > 0)
    #[validate(range(exclusive_min = 0.0))]
    pub clock_frequency_mhz: f64,
}

/// Coincidence matching configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_window_order"))]
pub struct MatchingConfig {
    /// Maximum tick distance for two opposite-stream events to match (strict `<`)
    #[serde(default = "default_coincidence_window")]
    #[validate(range(min = 1))]
    pub coincidence_window: u64,

    /// Maximum tick span kept in the buffer before the oldest entry is released
    #[serde(default = "default_max_window")]
    pub max_window: u64,

    /// Hard ceiling on buffered events
    #[serde(default = "default_capacity")]
    #[validate(range(min = 1))]
    pub capacity: usize,

    /// What to do when the ceiling is reached
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Wall-clock limit for draining at end of run (0 = unlimited)
    #[serde(default)]
    pub flush_timeout_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            coincidence_window: default_coincidence_window(),
            max_window: default_max_window(),
            capacity: default_capacity(),
            overflow_policy: OverflowPolicy::default(),
            flush_timeout_secs: 0,
        }
    }
}

impl MatchingConfig {
    /// Convenience constructor for the two windows, other fields default
    pub fn with_windows(coincidence_window: u64, max_window: u64) -> Self {
        Self {
            coincidence_window,
            max_window,
            ..Default::default()
        }
    }

    /// End-of-run drain limit, `None` if unlimited
    pub fn flush_timeout(&self) -> Option<Duration> {
        if self.flush_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.flush_timeout_secs))
        }
    }
}

fn default_coincidence_window() -> u64 {
    10
}

fn default_max_window() -> u64 {
    4_000_000
}

fn default_capacity() -> usize {
    1_000_000
}

fn validate_window_order(config: &MatchingConfig) -> Result<(), ValidationError> {
    if config.max_window < config.coincidence_window {
        let mut err = ValidationError::new("window_order");
        err.message = Some(Cow::Owned(format!(
            "max_window ({}) must be >= coincidence_window ({})",
            config.max_window, config.coincidence_window
        )));
        return Err(err);
    }
    Ok(())
}

/// Behaviour when the buffer reaches its hard ceiling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Release the oldest buffered event as a single, then insert
    #[default]
    EvictOldest,
    /// Refuse the incoming event and hand it back to the caller
    Reject,
}

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    1024
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Structured log output
    Log,
    /// One JSON document per emission
    JsonLines,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_defaults_are_valid() {
        let config = MatchingConfig::default();
        assert_eq!(config.coincidence_window, 10);
        assert!(config.validate().is_ok());
        assert_eq!(config.flush_timeout(), None);
    }

    #[test]
    fn test_max_window_below_coincidence_window_rejected() {
        let config = MatchingConfig::with_windows(10, 5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = MatchingConfig::with_windows(0, 50);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_frequency_rejected() {
        let settings = RunSettings {
            clock_frequency_mhz: 0.0,
        };
        assert!(settings.validate().is_err());

        let settings = RunSettings {
            clock_frequency_mhz: 20.0,
        };
        assert!(settings.validate().is_ok());
    }
}
