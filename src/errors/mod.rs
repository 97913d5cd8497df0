pub mod types;
pub mod classification;
pub mod retry;

pub use types::ScanError;
pub use classification::{Disposition, ErrorClassification};
pub use retry::{AttemptFuture, RetryConfig, with_retry};
