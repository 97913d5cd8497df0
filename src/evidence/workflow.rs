use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::errors::ScanError;

/// Append-only `workflow.log` with one timestamped line per event.
#[derive(Debug, Clone)]
pub struct WorkflowLogger {
    path: PathBuf,
}

impl WorkflowLogger {
    pub fn new(base_dir: &Path) -> Self {
        Self { path: base_dir.join("workflow.log") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn initialize(&self, session_id: &str, target: &str) -> Result<(), ScanError> {
        let header = format!(
            "# sinkprobe workflow log\n# Session: {}\n# Target: {}\n# Started: {}\n\n",
            session_id,
            target,
            Utc::now().to_rfc3339()
        );
        tokio::fs::write(&self.path, &header).await?;
        Ok(())
    }

    pub async fn log_event(&self, message: &str) -> Result<(), ScanError> {
        let line = format!("[{}] {}\n", Utc::now().format("%H:%M:%S%.3f"), message);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}
