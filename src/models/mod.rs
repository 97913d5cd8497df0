pub mod candidate;
pub mod context;
pub mod finding;
pub mod point;
pub mod report;
pub mod signal;

pub use candidate::*;
pub use context::ContextTag;
pub use finding::*;
pub use point::*;
pub use report::{SessionErrorRecord, SessionReport};
pub use signal::*;
