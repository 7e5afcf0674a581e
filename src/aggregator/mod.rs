/// Severity derivation and fingerprinting
pub mod classify;
/// Error history with retention
pub mod error_aggregator;

pub use classify::{classify_severity, fingerprint};
pub use error_aggregator::{ErrorAggregator, ErrorStats, TopError};
