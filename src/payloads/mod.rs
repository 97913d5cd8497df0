pub mod body;
mod builtin;
pub mod catalog;
pub mod evasion;
pub mod rng;
pub mod selector;

pub use crate::models::Requirements;
pub use catalog::{parse_wordlist, PayloadCatalog, PayloadTemplate, WordlistMode};
pub use evasion::{EvasionChain, EvasionLevel, Mutation, TransformKind, WrapperStyle};
pub use rng::{canary_token, SeededStream};
pub use selector::{CandidateStream, PayloadSelector, StreamEnd};
