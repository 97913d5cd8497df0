use crate::models::{ExecutionSignal, Severity};
use super::stage::FuzzStage;

/// Messages streamed from the orchestrator for live display.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    SessionStarted {
        session_id: String,
        target: String,
        seed: u64,
    },
    StageEntered {
        stage: FuzzStage,
        display_name: String,
    },
    /// Fuzzing of one injection point started.
    PointStarted {
        point: String,
        context: String,
        eligible: usize,
    },
    AttemptCompleted {
        ordinal: u32,
        point: String,
        template_id: String,
        signal: ExecutionSignal,
    },
    FindingRecorded {
        id: String,
        point: String,
        signal: ExecutionSignal,
        severity: Severity,
        score: u8,
    },
    SessionFinished {
        findings: usize,
        attempts: usize,
        error: Option<String>,
    },
}
