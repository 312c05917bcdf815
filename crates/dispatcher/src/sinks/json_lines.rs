//! JsonLinesSink - one JSON document per emission

use contracts::{ContractError, DataSink, Emission};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Configuration for JsonLinesSink
#[derive(Debug, Clone)]
pub struct JsonLinesSinkConfig {
    /// Output file
    pub path: PathBuf,
    /// Append instead of truncating an existing file
    pub append: bool,
}

impl JsonLinesSinkConfig {
    /// Create config from params map
    ///
    /// `path` is required; `append` accepts `true`/`false` (default false).
    pub fn from_params(params: &HashMap<String, String>) -> std::io::Result<Self> {
        let path = params.get("path").map(PathBuf::from).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing 'path' param")
        })?;
        let append = params
            .get("append")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self { path, append })
    }
}

/// Sink that appends emissions to a JSON Lines file
pub struct JsonLinesSink {
    name: String,
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl JsonLinesSink {
    /// Create a new JsonLinesSink, creating parent directories as needed
    pub fn new(name: impl Into<String>, config: JsonLinesSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            path: config.path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = JsonLinesSinkConfig::from_params(params)?;
        Self::new(name, config)
    }

    /// Output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written so far
    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    fn write_line(&mut self, emission: &Emission) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, emission)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }
}

impl DataSink for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "json_lines_sink_write",
        skip(self, emission),
        fields(sink = %self.name, kind = emission.kind())
    )]
    async fn write(&mut self, emission: &Emission) -> Result<(), ContractError> {
        self.write_line(emission)
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    #[instrument(name = "json_lines_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.writer
            .flush()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        debug!(sink = %self.name, lines = self.lines, "Flushed");
        Ok(())
    }

    #[instrument(name = "json_lines_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        info!(
            sink = %self.name,
            path = %self.path.display(),
            lines = self.lines,
            "JsonLinesSink closed"
        );
        Ok(())
    }
}
