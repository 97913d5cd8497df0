use super::types::ScanError;

/// How a caller must react to an error, independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Try the same operation again after a backoff.
    Retryable,
    /// Drop the current attempt (or point) and keep scanning.
    SkipAndContinue,
    /// Stop the session and flush what has been collected.
    Fatal,
}

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub disposition: Disposition,
}

impl ErrorClassification {
    pub fn retryable(&self) -> bool {
        self.disposition == Disposition::Retryable
    }

    pub fn is_fatal(&self) -> bool {
        self.disposition == Disposition::Fatal
    }
}

impl ScanError {
    /// Classify this error to determine its type and the propagation policy.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Retryable errors
            ScanError::Navigation { .. } => ErrorClassification {
                error_type: "NavigationError",
                disposition: Disposition::Retryable,
            },

            // Per-attempt failures, isolated from the session
            ScanError::Evaluation(_) => ErrorClassification {
                error_type: "EvaluationError",
                disposition: Disposition::SkipAndContinue,
            },
            ScanError::DetectionTimeout(_) => ErrorClassification {
                error_type: "DetectionTimeout",
                disposition: Disposition::SkipAndContinue,
            },
            ScanError::CspParse(_) => ErrorClassification {
                error_type: "CSPParseError",
                disposition: Disposition::SkipAndContinue,
            },
            ScanError::CatalogExhausted(_) => ErrorClassification {
                error_type: "CatalogExhausted",
                disposition: Disposition::SkipAndContinue,
            },
            ScanError::Evidence(_) => ErrorClassification {
                error_type: "EvidenceError",
                disposition: Disposition::SkipAndContinue,
            },
            ScanError::Io(_) => ErrorClassification {
                error_type: "IoError",
                disposition: Disposition::SkipAndContinue,
            },
            ScanError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                disposition: Disposition::SkipAndContinue,
            },

            // Session-level failures
            ScanError::FatalBrowser(_) => ErrorClassification {
                error_type: "FatalBrowserError",
                disposition: Disposition::Fatal,
            },
            ScanError::CatalogLoad(_) => ErrorClassification {
                error_type: "CatalogLoadError",
                disposition: Disposition::Fatal,
            },
            ScanError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                disposition: Disposition::Fatal,
            },
            ScanError::InvalidTarget(_) => ErrorClassification {
                error_type: "InvalidTargetError",
                disposition: Disposition::Fatal,
            },
            ScanError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                disposition: Disposition::Fatal,
            },
            ScanError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                disposition: Disposition::Fatal,
            },
        }
    }
}
