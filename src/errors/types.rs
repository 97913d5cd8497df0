use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Navigation error ({url}): {reason}")]
    Navigation { url: String, reason: String },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("No execution signal within {0:?}")]
    DetectionTimeout(Duration),

    #[error("CSP parse error: {0}")]
    CspParse(String),

    #[error("No remaining candidates for injection point {0}")]
    CatalogExhausted(String),

    #[error("Payload catalog error: {0}")]
    CatalogLoad(String),

    #[error("Browser unusable: {0}")]
    FatalBrowser(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Evidence error: {0}")]
    Evidence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    pub fn navigation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        ScanError::Navigation { url: url.into(), reason: reason.into() }
    }
}
