use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ScanSettings;
use crate::payloads::{EvasionLevel, WordlistMode};
use crate::pipeline::UaRotation;
use crate::reporting::OutputFormat;
use crate::scoring::SeverityPolicy;

#[derive(Parser)]
#[command(
    name = "sinkprobe",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ", built ", env!("BUILD_TIMESTAMP"), ")"),
    about = "Browser-driven reflected and DOM-based XSS detection"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan one authorized target
    Scan(ScanArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Flags override the configuration file; unset flags leave it alone.
#[derive(Args, Clone, Default)]
pub struct ScanArgs {
    /// Target URL (http or https)
    #[arg(short, long)]
    pub target: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output directory for evidence and reports
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Terminal rendering: table, json, ndjson, summary
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,

    /// Do not fuzz form fields
    #[arg(long)]
    pub skip_forms: bool,

    /// Do not fuzz URL query parameters
    #[arg(long)]
    pub skip_url: bool,

    /// Also probe common parameter names absent from the URL
    #[arg(long)]
    pub synthetic_params: bool,

    #[arg(long)]
    pub max_forms: Option<usize>,

    #[arg(long)]
    pub max_params: Option<usize>,

    /// Global payload budget
    #[arg(long)]
    pub max_payloads: Option<usize>,

    /// Payload budget per injection point
    #[arg(long)]
    pub max_per_point: Option<usize>,

    /// Treat the target as having no CSP
    #[arg(long)]
    pub ignore_csp: bool,

    /// Reproducibility seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Detection window per attempt in milliseconds
    #[arg(long)]
    pub dwell_ms: Option<u64>,

    /// Fixed User-Agent (disables rotation)
    #[arg(long)]
    pub user_agent: Option<String>,

    /// User-Agent rotation: session or per-attempt
    #[arg(long)]
    pub ua_rotation: Option<UaRotation>,

    /// Delay between attempts in milliseconds
    #[arg(long)]
    pub pacing_ms: Option<u64>,

    /// Pacing jitter as a fraction in [0, 1]
    #[arg(long)]
    pub jitter: Option<f64>,

    /// Warm-up navigations before fuzzing
    #[arg(long)]
    pub warmup: Option<u32>,

    #[arg(long)]
    pub warmup_wait_ms: Option<u64>,

    /// Navigation retries before an attempt is skipped
    #[arg(long)]
    pub retries: Option<u32>,

    #[arg(long)]
    pub backoff_ms: Option<u64>,

    #[arg(long)]
    pub nav_timeout_ms: Option<u64>,

    /// Record a trace archive per finding
    #[arg(long)]
    pub trace_on_hit: bool,

    /// Severity policy: default, owasp, cvss
    #[arg(long)]
    pub severity_policy: Option<SeverityPolicy>,

    /// Evasion level: off, light, aggressive
    #[arg(long)]
    pub evasion: Option<EvasionLevel>,

    /// Extra payload wordlist file or directory (repeatable)
    #[arg(long = "wordlist")]
    pub wordlists: Vec<PathBuf>,

    /// extend or replace the built-in catalog
    #[arg(long)]
    pub wordlist_mode: Option<WordlistMode>,

    /// Run the browser with a visible window
    #[arg(long)]
    pub headed: bool,

    /// Node.js executable driving Playwright
    #[arg(long, default_value = "node")]
    pub node: String,
}

macro_rules! set {
    ($dst:expr, $src:expr) => {
        if let Some(v) = $src {
            $dst = v;
        }
    };
}

impl ScanArgs {
    pub fn apply(&self, s: &mut ScanSettings) {
        if self.skip_forms {
            s.fuzz_forms = false;
        }
        if self.skip_url {
            s.fuzz_url = false;
        }
        if self.synthetic_params {
            s.synthetic_params = true;
        }
        if self.ignore_csp {
            s.csp_aware = false;
        }
        if self.trace_on_hit {
            s.trace_on_hit = true;
        }
        if self.headed {
            s.headless = false;
        }
        if self.user_agent.is_some() {
            s.user_agent = self.user_agent.clone();
        }
        if !self.wordlists.is_empty() {
            s.wordlists = self.wordlists.clone();
        }
        set!(s.output_dir, self.output.clone());
        set!(s.max_forms, self.max_forms);
        set!(s.max_params, self.max_params);
        set!(s.max_payloads, self.max_payloads);
        set!(s.max_payloads_per_point, self.max_per_point);
        set!(s.seed, self.seed);
        set!(s.dwell_timeout_ms, self.dwell_ms);
        set!(s.ua_rotation, self.ua_rotation);
        set!(s.pacing_ms, self.pacing_ms);
        set!(s.jitter_pct, self.jitter);
        set!(s.warmup_requests, self.warmup);
        set!(s.warmup_wait_ms, self.warmup_wait_ms);
        set!(s.navigation_retries, self.retries);
        set!(s.backoff_ms, self.backoff_ms);
        set!(s.navigation_timeout_ms, self.nav_timeout_ms);
        set!(s.severity_policy, self.severity_policy);
        set!(s.evasion, self.evasion);
        set!(s.wordlist_mode, self.wordlist_mode);
    }
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_settings() {
        let cli = Cli::parse_from([
            "sinkprobe", "scan", "-t", "https://app.test/", "--seed", "7", "--skip-forms",
            "--evasion", "off", "--severity-policy", "owasp", "--wordlist", "lists/",
            "--format", "summary",
        ]);
        let Commands::Scan(args) = cli.command else { panic!("expected scan") };
        assert_eq!(args.format, OutputFormat::Summary);

        let mut settings = ScanSettings { max_payloads: 50, ..Default::default() };
        args.apply(&mut settings);
        assert_eq!(settings.seed, 7);
        assert!(!settings.fuzz_forms);
        assert!(settings.fuzz_url);
        assert_eq!(settings.evasion, EvasionLevel::Off);
        assert_eq!(settings.severity_policy, SeverityPolicy::Owasp);
        assert_eq!(settings.wordlists, vec![PathBuf::from("lists/")]);
        assert_eq!(settings.max_payloads, 50);
    }

    #[test]
    fn test_unset_flags_keep_file_values() {
        let mut settings = ScanSettings { dwell_timeout_ms: 800, csp_aware: true, ..Default::default() };
        ScanArgs::default().apply(&mut settings);
        assert_eq!(settings.dwell_timeout_ms, 800);
        assert!(settings.csp_aware);
    }
}
