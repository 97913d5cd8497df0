use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::errors::ScanError;
use crate::models::SessionReport;
use crate::session::StageCounter;
use super::workflow::WorkflowLogger;
use super::EvidenceSink;

/// Atomic file write: write to temp, then rename.
async fn atomic_write(path: &Path, content: &[u8]) -> Result<(), ScanError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Keep evidence file names to a safe character set.
fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Debug, Serialize)]
struct SessionMetrics<'a> {
    session_id: &'a str,
    target: &'a str,
    seed: u64,
    started_at: String,
    finished_at: String,
    duration_ms: u64,
    payloads_used: usize,
    rng_position: u64,
    last_stage: &'a str,
    stages: &'a BTreeMap<String, StageCounter>,
    finding_counts: BTreeMap<String, usize>,
    confirmed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    network_archive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Evidence under one output directory:
///
/// ```text
/// <root>/workflow.log
/// <root>/evidences/hit_<tag>.png
/// <root>/trace/trace_<tag>.zip
/// <root>/findings.json
/// <root>/report.json
/// <root>/session_metrics.json
/// ```
pub struct FsEvidenceSink {
    root: PathBuf,
    workflow: WorkflowLogger,
    network_archive: Mutex<Option<PathBuf>>,
}

impl FsEvidenceSink {
    pub async fn initialize(root: &Path) -> Result<Self, ScanError> {
        tokio::fs::create_dir_all(root.join("evidences")).await?;
        tokio::fs::create_dir_all(root.join("trace")).await?;
        Ok(Self {
            root: root.to_path_buf(),
            workflow: WorkflowLogger::new(root),
            network_archive: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn archive(&self) -> Option<PathBuf> {
        self.network_archive.lock().ok().and_then(|g| g.clone())
    }
}

#[async_trait]
impl EvidenceSink for FsEvidenceSink {
    async fn begin_session(&self, session_id: &str, target: &str) -> Result<(), ScanError> {
        self.workflow.initialize(session_id, target).await
    }

    async fn log_event(&self, message: &str) -> Result<(), ScanError> {
        self.workflow.log_event(message).await
    }

    async fn store_screenshot(&self, tag: &str, png: &[u8]) -> Result<String, ScanError> {
        let path = self.root.join("evidences").join(format!("hit_{}.png", sanitize_tag(tag)));
        tokio::fs::write(&path, png).await?;
        Ok(path.display().to_string())
    }

    fn trace_path(&self, tag: &str) -> PathBuf {
        self.root.join("trace").join(format!("trace_{}.zip", sanitize_tag(tag)))
    }

    async fn register_network_archive(&self, path: &Path) -> Result<(), ScanError> {
        if let Ok(mut guard) = self.network_archive.lock() {
            *guard = Some(path.to_path_buf());
        }
        self.workflow
            .log_event(&format!("network archive: {}", path.display()))
            .await
    }

    async fn finish_session(&self, report: &SessionReport) -> Result<(), ScanError> {
        let findings = serde_json::to_vec_pretty(&report.findings)?;
        atomic_write(&self.root.join("findings.json"), &findings).await?;

        let mut full = report.clone();
        if full.network_archive.is_none() {
            full.network_archive = self.archive().map(|p| p.display().to_string());
        }
        atomic_write(&self.root.join("report.json"), &serde_json::to_vec_pretty(&full)?).await?;

        let metrics = SessionMetrics {
            session_id: &report.session_id,
            target: &report.target,
            seed: report.seed,
            started_at: report.started_at.to_rfc3339(),
            finished_at: report.finished_at.to_rfc3339(),
            duration_ms: report.duration_ms(),
            payloads_used: report.payloads_used,
            rng_position: report.rng_position,
            last_stage: &report.last_stage,
            stages: &report.counters,
            finding_counts: report.finding_counts(),
            confirmed: report.confirmed_count(),
            network_archive: full.network_archive.clone(),
            error: report.error.as_ref().map(|e| format!("{}: {}", e.error_type, e.message)),
        };
        atomic_write(&self.root.join("session_metrics.json"), &serde_json::to_vec_pretty(&metrics)?).await?;

        self.workflow
            .log_event(&format!("session finished: {} finding(s)", report.findings.len()))
            .await?;
        info!(path = %self.root.display(), findings = report.findings.len(), "Evidence written");
        Ok(())
    }
}
