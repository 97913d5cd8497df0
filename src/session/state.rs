use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ExecutionSignal, Finding};
use crate::payloads::SeededStream;
use super::affinity::AffinityLedger;

/// Counters bounding the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budgets {
    pub max_forms: usize,
    pub max_params: usize,
    /// Global payload budget shared by every injection point.
    pub max_payloads: usize,
    pub max_payloads_per_point: usize,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_forms: 10,
            max_params: 8,
            max_payloads: 200,
            max_payloads_per_point: 25,
        }
    }
}

/// Per-stage tallies reported at the end of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounter {
    pub points: usize,
    pub attempts: usize,
    pub findings: usize,
    pub skipped: usize,
}

/// Run-scoped state. Sole owner of the seeded random stream.
#[derive(Debug)]
pub struct ScanSession {
    pub id: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    rng: SeededStream,
    budgets: Budgets,
    payloads_used: usize,
    ordinal: u32,
    affinity: AffinityLedger,
    findings: Vec<Finding>,
    counters: BTreeMap<String, StageCounter>,
}

impl ScanSession {
    pub fn new(target: impl Into<String>, seed: u64, budgets: Budgets) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            started_at: Utc::now(),
            rng: SeededStream::new(seed),
            budgets,
            payloads_used: 0,
            ordinal: 0,
            affinity: AffinityLedger::new(),
            findings: Vec::new(),
            counters: BTreeMap::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn rng_position(&self) -> u64 {
        self.rng.position()
    }

    /// Lent to the selector and evasion chain only.
    pub(crate) fn rng_mut(&mut self) -> &mut SeededStream {
        &mut self.rng
    }

    pub fn budgets(&self) -> &Budgets {
        &self.budgets
    }

    pub fn payloads_used(&self) -> usize {
        self.payloads_used
    }

    pub fn remaining_payloads(&self) -> usize {
        self.budgets.max_payloads.saturating_sub(self.payloads_used)
    }

    pub fn payload_budget_exhausted(&self) -> bool {
        self.remaining_payloads() == 0
    }

    /// Take one unit of the global budget and return the next attempt
    /// ordinal, or `None` when the budget is spent.
    pub(crate) fn take_payload(&mut self) -> Option<u32> {
        if self.payload_budget_exhausted() {
            return None;
        }
        self.payloads_used += 1;
        self.ordinal += 1;
        Some(self.ordinal)
    }

    pub fn affinity(&self) -> &AffinityLedger {
        &self.affinity
    }

    pub fn affinity_mut(&mut self) -> &mut AffinityLedger {
        &mut self.affinity
    }

    pub fn counter_mut(&mut self, stage: &str) -> &mut StageCounter {
        self.counters.entry(stage.to_string()).or_default()
    }

    pub fn counters(&self) -> &BTreeMap<String, StageCounter> {
        &self.counters
    }

    /// Id the next recorded finding will get.
    pub fn next_finding_id(&self) -> String {
        format!("F-{:03}", self.findings.len() + 1)
    }

    /// Append a finding, assigning its id.
    pub fn record_finding(&mut self, mut finding: Finding) -> &Finding {
        finding.id = self.next_finding_id();
        self.findings.push(finding);
        let idx = self.findings.len() - 1;
        &self.findings[idx]
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn has_confirmed(&self) -> bool {
        self.findings.iter().any(|f| f.signal == ExecutionSignal::Confirmed)
    }

    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }
}
