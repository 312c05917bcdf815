//! Error types for CLI operations.

use std::path::Path;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration loading error (parse or validation)
    #[error("Failed to load configuration: {0}")]
    Config(#[from] contracts::ContractError),

    /// Input records file not found
    #[error("Input file not found: {path}")]
    InputNotFound { path: String },

    /// Ingestion setup or replay error
    #[error("Ingestion failed: {0}")]
    Ingestion(#[from] ingestion::IngestionError),

    /// Matcher construction error
    #[error("Matcher setup failed: {0}")]
    Engine(#[from] coinc_engine::EngineError),

    /// Sink setup error
    #[error("Dispatcher setup failed: {0}")]
    Dispatcher(#[from] dispatcher::DispatcherError),

    /// Pipeline execution error
    #[error("Pipeline execution failed: {message}")]
    PipelineExecution { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn input_not_found(path: &Path) -> Self {
        Self::InputNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn pipeline_execution(message: impl Into<String>) -> Self {
        Self::PipelineExecution {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
