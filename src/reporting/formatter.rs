use std::collections::BTreeMap;
use std::str::FromStr;

use console::style;

use crate::errors::ScanError;
use crate::models::{ExecutionSignal, ScoredFinding, Severity, SessionReport};

const SEVERITY_ORDER: [Severity; 5] = [
    Severity::Critical,
    Severity::High,
    Severity::Medium,
    Severity::Low,
    Severity::Info,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Ndjson,
    Summary,
}

impl FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            "summary" => Ok(Self::Summary),
            _ => Err(format!("Unknown output format: {}. Use table, json, ndjson or summary", s)),
        }
    }
}

pub fn render(report: &SessionReport, format: OutputFormat) -> Result<String, ScanError> {
    match format {
        OutputFormat::Table => Ok(format_table(&report.findings)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&report.findings)?),
        OutputFormat::Ndjson => format_ndjson(&report.findings),
        OutputFormat::Summary => Ok(format_summary(report)),
    }
}

fn styled_severity(severity: Severity) -> String {
    let label = format!("{:<8}", severity.as_str().to_uppercase());
    match severity {
        Severity::Critical => style(label).red().bold().to_string(),
        Severity::High => style(label).red().to_string(),
        Severity::Medium => style(label).yellow().to_string(),
        Severity::Low => style(label).cyan().to_string(),
        Severity::Info => style(label).dim().to_string(),
    }
}

fn styled_signal(signal: ExecutionSignal) -> String {
    let label = format!("{:<9}", signal.as_str());
    match signal {
        ExecutionSignal::Confirmed => style(label).green().bold().to_string(),
        ExecutionSignal::Suspected => style(label).yellow().to_string(),
        ExecutionSignal::None => style(label).dim().to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

pub fn format_table(findings: &[ScoredFinding]) -> String {
    if findings.is_empty() {
        return format!("{}\n", style("No findings.").dim());
    }
    let mut out = format!(
        "{:<6} {:<8} {:>5} {:<9} {:<28} {:<10} {:<20} {}\n",
        "ID", "SEVERITY", "SCORE", "SIGNAL", "POINT", "CONTEXT", "SINK", "TEMPLATE"
    );
    for sf in findings {
        let f = &sf.finding;
        out.push_str(&format!(
            "{:<6} {} {:>5} {} {:<28} {:<10} {:<20} {}\n",
            f.id,
            styled_severity(sf.severity.label),
            sf.severity.score,
            styled_signal(f.signal),
            truncate(&f.point.label(), 28),
            f.context().as_str(),
            f.sink.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
            f.candidate.template_id,
        ));
    }
    out
}

pub fn format_ndjson(findings: &[ScoredFinding]) -> Result<String, ScanError> {
    let mut out = String::new();
    for f in findings {
        out.push_str(&serde_json::to_string(f)?);
        out.push('\n');
    }
    Ok(out)
}

/// Counts by severity and by delivery channel, then the five highest scores.
pub fn format_summary(report: &SessionReport) -> String {
    let mut by_severity: BTreeMap<u8, usize> = BTreeMap::new();
    let mut by_channel: BTreeMap<&'static str, usize> = BTreeMap::new();
    for sf in &report.findings {
        *by_severity.entry(sf.severity.label.rank()).or_insert(0) += 1;
        *by_channel.entry(sf.finding.channel().as_str()).or_insert(0) += 1;
    }

    let mut out = String::new();
    out.push_str(&format!("{} {}\n", style("Target:").bold(), report.target));
    out.push_str(&format!(
        "Session {} | seed {} | {} payload(s) | {}ms\n",
        report.session_id,
        report.seed,
        report.payloads_used,
        report.duration_ms()
    ));
    if let Some(err) = &report.error {
        out.push_str(&format!("{} {}: {}\n", style("Aborted:").red().bold(), err.error_type, err.message));
    }

    out.push_str(&format!("\n{}\n", style("By severity").bold()));
    for severity in SEVERITY_ORDER {
        let count = by_severity.get(&severity.rank()).copied().unwrap_or(0);
        out.push_str(&format!("  {} {}\n", styled_severity(severity), count));
    }
    out.push_str(&format!("  {:<8} {}\n", "TOTAL", report.findings.len()));

    out.push_str(&format!("\n{}\n", style("By channel").bold()));
    if by_channel.is_empty() {
        out.push_str("  -\n");
    }
    for (channel, count) in &by_channel {
        out.push_str(&format!("  {:<12} {}\n", channel, count));
    }

    let mut top: Vec<&ScoredFinding> = report.findings.iter().collect();
    top.sort_by(|a, b| b.severity.score.cmp(&a.severity.score).then_with(|| a.finding.id.cmp(&b.finding.id)));
    if !top.is_empty() {
        out.push_str(&format!("\n{}\n", style("Top findings").bold()));
        for sf in top.into_iter().take(5) {
            out.push_str(&format!(
                "  {:>3} {} {} {} via {}\n",
                sf.severity.score,
                styled_severity(sf.severity.label),
                sf.finding.id,
                sf.finding.point.label(),
                sf.finding.candidate.template_id
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryMode, SinkKind};
    use crate::scoring::{self, fixtures, SeverityPolicy};
    use chrono::Utc;

    fn report(n: usize) -> SessionReport {
        let findings: Vec<_> = (0..n)
            .map(|i| {
                let mut f = fixtures::finding(
                    if i % 2 == 0 { ExecutionSignal::Confirmed } else { ExecutionSignal::Suspected },
                    Some(SinkKind::InnerHtml),
                    DeliveryMode::Reflected,
                    false,
                );
                f.id = format!("F-{:03}", i + 1);
                f
            })
            .collect();
        SessionReport {
            session_id: "s-1".into(),
            target: "http://t.local/".into(),
            seed: 1337,
            rng_position: 0,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            severity_policy: "default".into(),
            csp: None,
            last_stage: "fuzz-url-params".into(),
            payloads_used: n,
            counters: BTreeMap::new(),
            findings: scoring::score_all(&findings, SeverityPolicy::Default),
            network_archive: None,
            error: None,
        }
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("ndjson".parse::<OutputFormat>().unwrap(), OutputFormat::Ndjson);
        assert_eq!("SUMMARY".parse::<OutputFormat>().unwrap(), OutputFormat::Summary);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_ndjson_one_line_per_finding() {
        let r = report(3);
        let out = format_ndjson(&r.findings).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], "F-001");
        assert_eq!(first["severity"]["policy"], "default");
    }

    #[test]
    fn test_table_lists_every_finding() {
        console::set_colors_enabled(false);
        let out = format_table(&report(2).findings);
        assert!(out.starts_with("ID"));
        assert!(out.contains("F-001"));
        assert!(out.contains("F-002"));
        assert!(format_table(&[]).contains("No findings"));
    }

    #[test]
    fn test_summary_top_five() {
        console::set_colors_enabled(false);
        let out = format_summary(&report(7));
        assert!(out.contains("TOTAL    7"));
        assert!(out.contains("url_param"));
        let top = out.split("Top findings").nth(1).unwrap();
        assert_eq!(top.lines().filter(|l| l.contains("F-0")).count(), 5);
    }
}
