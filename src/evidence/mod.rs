pub mod fs;
pub mod workflow;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::ScanError;
use crate::models::SessionReport;

pub use fs::FsEvidenceSink;
pub use workflow::WorkflowLogger;

/// Receives evidence and the final report. Storage failures are reported
/// as `ScanError::Evidence` or `ScanError::Io` and never end a session.
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    async fn begin_session(&self, session_id: &str, target: &str) -> Result<(), ScanError>;

    /// One human-readable line in the workflow log.
    async fn log_event(&self, message: &str) -> Result<(), ScanError>;

    /// Store a screenshot for the finding tagged `tag`; returns its reference.
    async fn store_screenshot(&self, tag: &str, png: &[u8]) -> Result<String, ScanError>;

    /// Where the browser should write the trace archive for `tag`.
    fn trace_path(&self, tag: &str) -> PathBuf;

    /// Session-wide network archive recorded by the browser.
    async fn register_network_archive(&self, path: &Path) -> Result<(), ScanError>;

    /// Final ordered findings with their scores, plus the session record.
    async fn finish_session(&self, report: &SessionReport) -> Result<(), ScanError>;
}
