pub mod formatter;

pub use formatter::{format_ndjson, format_summary, format_table, render, OutputFormat};
