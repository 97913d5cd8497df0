pub mod affinity;
pub mod state;

pub use affinity::AffinityLedger;
pub use state::{Budgets, ScanSession, StageCounter};
