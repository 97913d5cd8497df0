pub mod parser;
pub mod policy;

pub use parser::{parse_header, parse_policy, ParsedPolicy, SourceList};
pub use policy::{resolve_policy, CspPolicy, PolicySource};
