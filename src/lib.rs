pub mod browser;
pub mod cli;
pub mod config;
pub mod csp;
pub mod detector;
pub mod enumerate;
pub mod errors;
pub mod evidence;
pub mod models;
pub mod payloads;
pub mod pipeline;
pub mod reporting;
pub mod scoring;
pub mod session;
