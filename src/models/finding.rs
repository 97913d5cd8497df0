use serde::{Deserialize, Serialize};
use super::candidate::Candidate;
use super::context::ContextTag;
use super::point::{InjectionPoint, PointKind};
use super::signal::{ExecutionSignal, SinkKind};

/// Severity level for a finding, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Returns a numeric rank where lower values indicate higher severity.
    /// Critical = 0, High = 1, Medium = 2, Low = 3, Info = 4.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reflected: echoed by the server. DOM-based: executed through client-side
/// script alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Reflected,
    DomBased,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Reflected => "reflected",
            DeliveryMode::DomBased => "dom_based",
        }
    }
}

/// Where the canary was observed during the dwell window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalChannel {
    Sink,
    Title,
    Mutation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// A confirmed or suspected vulnerability. Append-only once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// `F-<n>` in discovery order.
    pub id: String,
    pub point: InjectionPoint,
    pub candidate: Candidate,
    pub signal: ExecutionSignal,
    pub delivery: DeliveryMode,
    /// First sink that received the token, if any.
    pub sink: Option<SinkKind>,
    pub channels: Vec<SignalChannel>,
    /// Executed although the target policy blocks inline script.
    pub csp_bypass: bool,
    pub evidence: EvidenceRefs,
}

impl Finding {
    pub fn context(&self) -> ContextTag {
        self.point.context
    }

    pub fn channel(&self) -> PointKind {
        self.point.kind
    }

    pub fn is_confirmed(&self) -> bool {
        self.signal == ExecutionSignal::Confirmed
    }

    /// Short tag for evidence file names.
    pub fn evidence_tag(&self) -> String {
        format!("{}_{}", self.id.to_ascii_lowercase(), self.candidate.template_id)
    }
}

/// Output of the scoring engine for one finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityScore {
    pub label: Severity,
    /// 0 to 100.
    pub score: u8,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredFinding {
    #[serde(flatten)]
    pub finding: Finding,
    pub severity: SeverityScore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rank_order() {
        assert!(Severity::Critical.rank() < Severity::High.rank());
        assert!(Severity::Low.rank() < Severity::Info.rank());
    }

    #[test]
    fn test_delivery_mode_serde() {
        let json = serde_json::to_string(&DeliveryMode::DomBased).unwrap();
        assert_eq!(json, "\"dom_based\"");
    }
}
