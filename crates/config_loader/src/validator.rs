//! 配置校验模块
//!
//! 校验规则：
//! - 字段级规则由 `validator` derive 给出 (窗口、容量、时钟频率)
//! - clock_frequency_mhz 必须为有限正数
//! - sink 名称非空且唯一
//! - json_lines sink 必须提供 `path` 参数
//! - queue_capacity > 0

use std::collections::HashSet;

use contracts::{ContractError, RunConfig, SinkType};
use ::validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// 校验 RunConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &RunConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_clock(config)?;
    validate_sinks(config)?;
    Ok(())
}

/// 运行 derive 生成的字段校验
fn validate_fields(config: &RunConfig) -> Result<(), ContractError> {
    match config.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let (field, message) = first_error(&errors, "")
                .unwrap_or_else(|| (String::from("<root>"), errors.to_string()));
            Err(ContractError::config_validation(field, message))
        }
    }
}

/// 取出第一个错误及其字段路径
fn first_error(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    for (field, kind) in errors.errors() {
        let path = match (prefix.is_empty(), field.as_ref()) {
            (true, "__all__") => String::from("<root>"),
            (false, "__all__") => prefix.to_string(),
            (true, name) => name.to_string(),
            (false, name) => format!("{prefix}.{name}"),
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                if let Some(err) = list.first() {
                    return Some((path, describe(err)));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_error(inner, &path) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_error(inner, &format!("{path}[{idx}]")) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

fn describe(err: &ValidationError) -> String {
    match &err.message {
        Some(message) => message.to_string(),
        None => {
            let mut text = format!("failed '{}' check", err.code);
            if let Some(value) = err.params.get("value") {
                text.push_str(&format!(", got {value}"));
            }
            text
        }
    }
}

/// 校验时钟频率 (NaN 不会被 range 规则拦截)
fn validate_clock(config: &RunConfig) -> Result<(), ContractError> {
    let freq = config.run.clock_frequency_mhz;
    if !freq.is_finite() || freq <= 0.0 {
        return Err(ContractError::config_validation(
            "run.clock_frequency_mhz",
            format!("clock_frequency_mhz must be a finite value > 0, got {freq}"),
        ));
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(config: &RunConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
        if sink.sink_type == SinkType::JsonLines && !sink.params.contains_key("path") {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.path", sink.name),
                "json_lines sink requires a 'path' parameter",
            ));
        }
    }
    Ok(())
}
