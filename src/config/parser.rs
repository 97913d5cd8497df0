use std::path::Path;
use crate::errors::ScanError;
use super::types::{ScanSettings, SinkprobeConfig};
use super::security::validate_security_patterns;
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

pub async fn parse_config(path: &Path) -> Result<SinkprobeConfig, ScanError> {
    if !path.exists() {
        return Err(ScanError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(ScanError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<SinkprobeConfig, ScanError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;

    validate_security_patterns(&yaml)?;
    validate_schema(&yaml)?;

    let config: SinkprobeConfig = serde_yaml::from_value(yaml)?;

    if let Some(target) = &config.target {
        validate_target(target)?;
    }
    validate_settings(&ScanSettings::from_config(&config))?;

    Ok(config)
}

/// Structural check against the JSON schema. Advisory: violations are logged.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), ScanError> {
    let json_str = serde_json::to_string(yaml)
        .map_err(|e| ScanError::Config(format!("Config conversion error: {}", e)))?;
    let json_value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| ScanError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| ScanError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

/// The target must be an absolute http(s) URL.
pub fn validate_target(target: &str) -> Result<url::Url, ScanError> {
    let parsed = url::Url::parse(target)
        .map_err(|e| ScanError::InvalidTarget(format!("{}: {}", target, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ScanError::InvalidTarget(format!(
            "{}: unsupported scheme '{}'",
            target, other
        ))),
    }
}

/// Values that parse but cannot drive a run.
pub fn validate_settings(settings: &ScanSettings) -> Result<(), ScanError> {
    if !(0.0..=1.0).contains(&settings.jitter_pct) {
        return Err(ScanError::Config(format!(
            "jitter_pct must be within [0, 1], got {}",
            settings.jitter_pct
        )));
    }
    if settings.dwell_timeout_ms == 0 {
        return Err(ScanError::Config("dwell_timeout_ms must be positive".into()));
    }
    if settings.navigation_timeout_ms == 0 {
        return Err(ScanError::Config("navigation_timeout_ms must be positive".into()));
    }
    if settings.max_payloads == 0 || settings.max_payloads_per_point == 0 {
        return Err(ScanError::Config("payload budgets must be positive".into()));
    }
    if !settings.fuzz_forms && !settings.fuzz_url {
        warn!("Both form and URL fuzzing disabled; only the fragment fallback will run");
    }
    if settings.max_payloads_per_point > settings.max_payloads {
        warn!(
            per_point = settings.max_payloads_per_point,
            global = settings.max_payloads,
            "Per-point budget exceeds the global payload budget"
        );
    }
    Ok(())
}
