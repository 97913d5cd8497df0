use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::csp::CspPolicy;
use crate::session::StageCounter;
use super::finding::{ScoredFinding, Severity};

/// Why a session ended early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionErrorRecord {
    pub error_type: String,
    pub message: String,
}

/// Everything a run produced, handed to the evidence sink once at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub target: String,
    pub seed: u64,
    /// Draws taken from the seeded stream over the whole run.
    pub rng_position: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub severity_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csp: Option<CspPolicy>,
    /// Last stage reached before `done`.
    pub last_stage: String,
    pub payloads_used: usize,
    pub counters: BTreeMap<String, StageCounter>,
    pub findings: Vec<ScoredFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_archive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionErrorRecord>,
}

impl SessionReport {
    /// Finding counts keyed by severity label.
    pub fn finding_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.findings {
            *counts.entry(f.severity.label.as_str().to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn confirmed_count(&self) -> usize {
        self.findings.iter().filter(|f| f.finding.is_confirmed()).count()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity.label).min_by_key(|s| s.rank())
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .unsigned_abs()
    }
}
