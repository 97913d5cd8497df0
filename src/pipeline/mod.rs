pub mod events;
pub mod orchestrator;
pub mod pacing;
pub mod stage;

pub use events::ScanEvent;
pub use orchestrator::FuzzOrchestrator;
pub use pacing::{Pacer, UaRotation, USER_AGENT_POOL};
pub use stage::{FuzzStage, StageDefinition, StageGuard, STAGES};
