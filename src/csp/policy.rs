use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::payloads::Requirements;
use super::parser::{parse_header, parse_policy, ParsedPolicy};

/// How the effective policy was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySource {
    /// CSP awareness disabled for the run.
    Unrestricted,
    /// Nothing captured; every restricted capability is assumed blocked.
    ConservativeDefault,
    /// A captured policy was malformed.
    Degraded,
    Captured,
}

/// Capability predicates of the target. Read-only once derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CspPolicy {
    pub allows_inline_script: bool,
    pub allows_inline_style: bool,
    pub allows_data_uri: bool,
    pub allows_blob_uri: bool,
    pub allows_eval: bool,
    pub source: PolicySource,
    /// Raw policy strings that contributed.
    pub raw: Vec<String>,
}

impl CspPolicy {
    pub fn unrestricted() -> Self {
        Self {
            allows_inline_script: true,
            allows_inline_style: true,
            allows_data_uri: true,
            allows_blob_uri: true,
            allows_eval: true,
            source: PolicySource::Unrestricted,
            raw: Vec::new(),
        }
    }

    pub fn conservative() -> Self {
        Self {
            allows_inline_script: false,
            allows_inline_style: false,
            allows_data_uri: false,
            allows_blob_uri: false,
            allows_eval: false,
            source: PolicySource::ConservativeDefault,
            raw: Vec::new(),
        }
    }

    /// Capabilities granted by one parsed policy.
    pub fn from_parsed(parsed: &ParsedPolicy) -> Self {
        let mut policy = Self::unrestricted();
        policy.source = PolicySource::Captured;
        policy.raw.push(parsed.raw.clone());

        if let Some(script) = parsed.script_sources() {
            policy.allows_inline_script = script.inline_effective();
            policy.allows_eval = script.unsafe_eval && !script.none;
            // `*` never matches data: or blob:
            policy.allows_data_uri = script.data_scheme && !script.none;
            policy.allows_blob_uri = script.blob_scheme && !script.none;
        }
        if let Some(style) = parsed.style_sources() {
            policy.allows_inline_style = style.inline_effective();
        }
        policy
    }

    /// A capability survives only if both policies allow it.
    pub fn intersect(&self, other: &CspPolicy) -> CspPolicy {
        let mut raw = self.raw.clone();
        raw.extend(other.raw.iter().cloned());
        let source = match (self.source, other.source) {
            (PolicySource::Unrestricted, s) | (s, PolicySource::Unrestricted) => s,
            (PolicySource::Degraded, _) | (_, PolicySource::Degraded) => PolicySource::Degraded,
            (PolicySource::ConservativeDefault, _) | (_, PolicySource::ConservativeDefault) => {
                PolicySource::ConservativeDefault
            }
            _ => PolicySource::Captured,
        };
        CspPolicy {
            allows_inline_script: self.allows_inline_script && other.allows_inline_script,
            allows_inline_style: self.allows_inline_style && other.allows_inline_style,
            allows_data_uri: self.allows_data_uri && other.allows_data_uri,
            allows_blob_uri: self.allows_blob_uri && other.allows_blob_uri,
            allows_eval: self.allows_eval && other.allows_eval,
            source,
            raw,
        }
    }

    /// Every capability `req` needs is allowed.
    pub fn permits(&self, req: &Requirements) -> bool {
        (!req.requires_inline || self.allows_inline_script)
            && (!req.needs_data || self.allows_data_uri)
            && (!req.needs_blob || self.allows_blob_uri)
            && (!req.needs_eval || self.allows_eval)
    }

    /// Inline script is blocked, so an executing payload got around the policy.
    pub fn restricts_inline(&self) -> bool {
        !self.allows_inline_script
    }
}

/// Derive the effective policy from captured enforcement headers and
/// `<meta http-equiv>` contents. Never fails: malformed input degrades to the
/// conservative default.
pub fn resolve_policy(headers: &[String], metas: &[String], csp_aware: bool) -> CspPolicy {
    if !csp_aware {
        return CspPolicy::unrestricted();
    }
    if headers.iter().chain(metas.iter()).all(|v| v.trim().is_empty()) {
        debug!("No CSP captured, using conservative default");
        return CspPolicy::conservative();
    }

    let mut effective = CspPolicy::unrestricted();
    for header in headers.iter().filter(|v| !v.trim().is_empty()) {
        match parse_header(header) {
            Ok(policies) => {
                for parsed in &policies {
                    effective = effective.intersect(&CspPolicy::from_parsed(parsed));
                }
            }
            Err(e) => return degraded(header, e),
        }
    }
    // Meta policies never carry multiple comma-joined policies.
    for meta in metas.iter().filter(|v| !v.trim().is_empty()) {
        match parse_policy(meta) {
            Ok(parsed) => effective = effective.intersect(&CspPolicy::from_parsed(&parsed)),
            Err(e) => return degraded(meta, e),
        }
    }
    debug!(
        inline = effective.allows_inline_script,
        eval = effective.allows_eval,
        data = effective.allows_data_uri,
        blob = effective.allows_blob_uri,
        "Resolved CSP"
    );
    effective
}

fn degraded(raw: &str, err: crate::errors::ScanError) -> CspPolicy {
    warn!(error = %err, policy = raw, "Malformed CSP, falling back to conservative default");
    let mut policy = CspPolicy::conservative();
    policy.source = PolicySource::Degraded;
    policy.raw.push(raw.to_string());
    policy
}
