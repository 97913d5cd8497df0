use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::payloads::{EvasionLevel, WordlistMode};
use crate::pipeline::UaRotation;
use crate::scoring::SeverityPolicy;
use crate::session::Budgets;

/// YAML configuration file. Every section and field is optional; unset
/// values keep the defaults of [`ScanSettings`].
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SinkprobeConfig {
    pub target: Option<String>,
    pub scan: Option<ScanSection>,
    pub stealth: Option<StealthSection>,
    pub browser: Option<BrowserSection>,
    pub payloads: Option<PayloadSection>,
    pub evidence: Option<EvidenceSection>,
    pub scoring: Option<ScoringSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScanSection {
    pub fuzz_forms: Option<bool>,
    pub fuzz_url: Option<bool>,
    pub max_forms: Option<usize>,
    pub max_params: Option<usize>,
    pub max_payloads: Option<usize>,
    pub max_payloads_per_point: Option<usize>,
    pub synthetic_params: Option<bool>,
    pub csp_aware: Option<bool>,
    pub seed: Option<u64>,
    pub dwell_timeout_ms: Option<u64>,
    pub evasion: Option<EvasionLevel>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StealthSection {
    pub user_agent: Option<String>,
    pub ua_rotation: Option<UaRotation>,
    pub pacing_ms: Option<u64>,
    pub jitter_pct: Option<f64>,
    pub warmup_requests: Option<u32>,
    pub warmup_wait_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BrowserSection {
    pub headless: Option<bool>,
    pub navigation_timeout_ms: Option<u64>,
    pub navigation_retries: Option<u32>,
    pub backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PayloadSection {
    pub wordlists: Option<Vec<PathBuf>>,
    pub wordlist_mode: Option<WordlistMode>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EvidenceSection {
    pub output_dir: Option<PathBuf>,
    pub trace_on_hit: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScoringSection {
    pub severity_policy: Option<SeverityPolicy>,
}

/// Every run-level knob, resolved from defaults, file and flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub fuzz_forms: bool,
    pub fuzz_url: bool,
    pub max_forms: usize,
    pub max_params: usize,
    pub max_payloads: usize,
    pub max_payloads_per_point: usize,
    pub synthetic_params: bool,
    pub csp_aware: bool,
    pub user_agent: Option<String>,
    pub ua_rotation: UaRotation,
    pub pacing_ms: u64,
    /// Fraction in [0, 1].
    pub jitter_pct: f64,
    pub warmup_requests: u32,
    pub warmup_wait_ms: u64,
    pub seed: u64,
    pub dwell_timeout_ms: u64,
    pub navigation_retries: u32,
    pub backoff_ms: u64,
    pub trace_on_hit: bool,
    pub severity_policy: SeverityPolicy,
    pub evasion: EvasionLevel,
    pub wordlists: Vec<PathBuf>,
    pub wordlist_mode: WordlistMode,
    pub output_dir: PathBuf,
    pub headless: bool,
    pub navigation_timeout_ms: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            fuzz_forms: true,
            fuzz_url: true,
            max_forms: 10,
            max_params: 8,
            max_payloads: 200,
            max_payloads_per_point: 25,
            synthetic_params: false,
            csp_aware: true,
            user_agent: None,
            ua_rotation: UaRotation::Session,
            pacing_ms: 0,
            jitter_pct: 0.0,
            warmup_requests: 0,
            warmup_wait_ms: 800,
            seed: 1337,
            dwell_timeout_ms: 4_000,
            navigation_retries: 2,
            backoff_ms: 500,
            trace_on_hit: false,
            severity_policy: SeverityPolicy::Default,
            evasion: EvasionLevel::Light,
            wordlists: Vec::new(),
            wordlist_mode: WordlistMode::Extend,
            output_dir: PathBuf::from("./results"),
            headless: true,
            navigation_timeout_ms: 15_000,
        }
    }
}

macro_rules! take {
    ($dst:expr, $src:expr) => {
        if let Some(v) = $src {
            $dst = v;
        }
    };
}

impl ScanSettings {
    /// Defaults overlaid with every value the file sets.
    pub fn from_config(config: &SinkprobeConfig) -> Self {
        let mut s = Self::default();
        if let Some(scan) = &config.scan {
            take!(s.fuzz_forms, scan.fuzz_forms);
            take!(s.fuzz_url, scan.fuzz_url);
            take!(s.max_forms, scan.max_forms);
            take!(s.max_params, scan.max_params);
            take!(s.max_payloads, scan.max_payloads);
            take!(s.max_payloads_per_point, scan.max_payloads_per_point);
            take!(s.synthetic_params, scan.synthetic_params);
            take!(s.csp_aware, scan.csp_aware);
            take!(s.seed, scan.seed);
            take!(s.dwell_timeout_ms, scan.dwell_timeout_ms);
            take!(s.evasion, scan.evasion);
        }
        if let Some(stealth) = &config.stealth {
            if stealth.user_agent.is_some() {
                s.user_agent = stealth.user_agent.clone();
            }
            take!(s.ua_rotation, stealth.ua_rotation);
            take!(s.pacing_ms, stealth.pacing_ms);
            take!(s.jitter_pct, stealth.jitter_pct);
            take!(s.warmup_requests, stealth.warmup_requests);
            take!(s.warmup_wait_ms, stealth.warmup_wait_ms);
        }
        if let Some(browser) = &config.browser {
            take!(s.headless, browser.headless);
            take!(s.navigation_timeout_ms, browser.navigation_timeout_ms);
            take!(s.navigation_retries, browser.navigation_retries);
            take!(s.backoff_ms, browser.backoff_ms);
        }
        if let Some(payloads) = &config.payloads {
            take!(s.wordlists, payloads.wordlists.clone());
            take!(s.wordlist_mode, payloads.wordlist_mode);
        }
        if let Some(evidence) = &config.evidence {
            take!(s.output_dir, evidence.output_dir.clone());
            take!(s.trace_on_hit, evidence.trace_on_hit);
        }
        if let Some(scoring) = &config.scoring {
            take!(s.severity_policy, scoring.severity_policy);
        }
        s
    }

    pub fn budgets(&self) -> Budgets {
        Budgets {
            max_forms: self.max_forms,
            max_params: self.max_params,
            max_payloads: self.max_payloads,
            max_payloads_per_point: self.max_payloads_per_point,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = ScanSettings::default();
        assert_eq!(s.seed, 1337);
        assert!(s.csp_aware);
        assert_eq!(s.budgets().max_params, 8);
        assert_eq!(s.evasion, EvasionLevel::Light);
    }

    #[test]
    fn test_from_config_overlays_only_set_values() {
        let yaml = r#"
target: https://app.test/
scan:
  max_payloads: 40
  evasion: aggressive
stealth:
  ua_rotation: per-attempt
  jitter_pct: 0.25
scoring:
  severity_policy: cvss
"#;
        let config: SinkprobeConfig = serde_yaml::from_str(yaml).unwrap();
        let s = ScanSettings::from_config(&config);
        assert_eq!(s.max_payloads, 40);
        assert_eq!(s.evasion, EvasionLevel::Aggressive);
        assert_eq!(s.ua_rotation, UaRotation::PerAttempt);
        assert_eq!(s.jitter_pct, 0.25);
        assert_eq!(s.severity_policy, SeverityPolicy::Cvss);
        assert_eq!(s.max_forms, 10);
        assert_eq!(s.dwell_timeout_ms, 4_000);
    }
}
