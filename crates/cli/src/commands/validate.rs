//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{OverflowPolicy, RunConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    clock_frequency_mhz: f64,
    coincidence_window: u64,
    max_window: u64,
    capacity: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    clock_frequency_mhz: config.run.clock_frequency_mhz,
                    coincidence_window: config.matching.coincidence_window,
                    max_window: config.matching.max_window,
                    capacity: config.matching.capacity,
                    sink_count: config.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &RunConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let matching = &config.matching;

    if config.sinks.is_empty() {
        warnings.push("No sinks configured - emissions are only counted".to_string());
    }

    if matching.max_window == matching.coincidence_window {
        warnings.push(
            "max_window equals coincidence_window - late partners will be emitted as singles"
                .to_string(),
        );
    }

    if matching.overflow_policy == OverflowPolicy::Reject {
        warnings.push(
            "overflow_policy = reject - events arriving at a full buffer are not emitted"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Clock: {} MHz", summary.clock_frequency_mhz);
            println!("  Coincidence window: {} ticks", summary.coincidence_window);
            println!("  Max window: {} ticks", summary.max_window);
            println!("  Capacity: {}", summary.capacity);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let file = write_config(
            r#"
[run]
clock_frequency_mhz = 20.0

[matching]
coincidence_window = 10
max_window = 10
overflow_policy = "reject"
"#,
        );
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };

        let result = validate_config(&args);
        assert!(result.valid);
        assert_eq!(result.warnings.map(|w| w.len()), Some(3));
        assert_eq!(result.summary.map(|s| s.max_window), Some(10));
    }

    #[test]
    fn test_invalid_clock() {
        let file = write_config("[run]\nclock_frequency_mhz = 0.0\n");
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        };

        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.is_some());
        assert!(run_validate(&args).is_err());
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: "/nonexistent/run.toml".into(),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }
}
