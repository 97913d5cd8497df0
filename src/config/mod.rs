pub mod parser;
pub mod schema;
pub mod types;
pub mod security;

pub use types::*;
pub use parser::{parse_config, parse_config_str, validate_settings, validate_target};
