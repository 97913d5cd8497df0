//! Deterministic finding severity. Every policy is a pure function of the
//! finding; nothing is cached between calls.

pub mod cvss;
pub mod owasp;
pub mod weighted;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{Finding, ScoredFinding, Severity, SeverityScore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityPolicy {
    #[default]
    Default,
    Owasp,
    Cvss,
}

impl SeverityPolicy {
    pub fn id(&self) -> &'static str {
        match self {
            SeverityPolicy::Default => "default",
            SeverityPolicy::Owasp => "owasp",
            SeverityPolicy::Cvss => "cvss",
        }
    }
}

impl std::fmt::Display for SeverityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for SeverityPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "owasp" => Ok(Self::Owasp),
            "cvss" => Ok(Self::Cvss),
            _ => Err(format!("Unknown severity policy: {}. Use default, owasp or cvss", s)),
        }
    }
}

pub fn score(finding: &Finding, policy: SeverityPolicy) -> SeverityScore {
    let (label, score) = match policy {
        SeverityPolicy::Default => weighted::score(finding),
        SeverityPolicy::Owasp => owasp::score(finding),
        SeverityPolicy::Cvss => cvss::score(finding),
    };
    SeverityScore {
        label,
        score: score.min(100),
        policy: policy.id().to_string(),
    }
}

/// Score every finding, keeping discovery order.
pub fn score_all(findings: &[Finding], policy: SeverityPolicy) -> Vec<ScoredFinding> {
    findings
        .iter()
        .map(|f| ScoredFinding {
            finding: f.clone(),
            severity: score(f, policy),
        })
        .collect()
}

/// Shared 0-100 banding.
pub(crate) fn band(score: u8) -> Severity {
    match score {
        90..=u8::MAX => Severity::Critical,
        70..=89 => Severity::High,
        40..=69 => Severity::Medium,
        15..=39 => Severity::Low,
        _ => Severity::Info,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::*;

    pub fn finding(signal: ExecutionSignal, sink: Option<SinkKind>, delivery: DeliveryMode, bypass: bool) -> Finding {
        let point = InjectionPoint {
            kind: PointKind::UrlParam,
            name: "q".into(),
            position: 0,
            context: ContextTag::HtmlText,
            form: None,
        };
        Finding {
            id: "F-001".into(),
            point: point.clone(),
            candidate: Candidate {
                ordinal: 1,
                point,
                template_id: "ht-svg-onload".into(),
                requirements: Requirements { requires_inline: true, ..Default::default() },
                uses_eval: false,
                token: "spk000000000001".into(),
                body: "<svg onload=\"top.document.title='spk000000000001'\">".into(),
                evasion_trace: Vec::new(),
            },
            signal,
            delivery,
            sink,
            channels: vec![SignalChannel::Sink],
            csp_bypass: bypass,
            evidence: EvidenceRefs::default(),
        }
    }

    /// The same finding with the point's context replaced.
    pub fn in_context(mut finding: Finding, context: ContextTag) -> Finding {
        finding.point.context = context;
        finding.candidate.point.context = context;
        finding
    }
}
