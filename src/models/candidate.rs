use serde::{Deserialize, Serialize};
use super::point::InjectionPoint;

/// Capabilities a payload template needs from the target's CSP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirements {
    pub requires_inline: bool,
    pub needs_data: bool,
    pub needs_blob: bool,
    #[serde(default)]
    pub needs_eval: bool,
}

impl Requirements {
    pub fn labels(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.requires_inline {
            out.push("inline");
        }
        if self.needs_data {
            out.push("data");
        }
        if self.needs_blob {
            out.push("blob");
        }
        if self.needs_eval {
            out.push("eval");
        }
        out
    }
}

/// One deliverable payload, produced by the selector and consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Session-wide attempt number, starting at 1.
    pub ordinal: u32,
    pub point: InjectionPoint,
    pub template_id: String,
    pub requirements: Requirements,
    /// Set when an eval-based wrapper was applied.
    pub uses_eval: bool,
    /// Canary embedded in the body.
    pub token: String,
    /// Mutated payload text exactly as delivered.
    pub body: String,
    pub evasion_trace: Vec<String>,
}

impl Candidate {
    /// Capabilities the delivered bytes need, including the chosen wrapper.
    pub fn effective_requirements(&self) -> Requirements {
        Requirements {
            needs_eval: self.requirements.needs_eval || self.uses_eval,
            ..self.requirements
        }
    }
}
