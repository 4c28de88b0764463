//! Telemetry error types

use thiserror::Error;

/// Errors raised by the observability substrate
///
/// Telemetry errors are always recoverable and never degrade pipeline
/// throughput; exports retry with backoff.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The export endpoint rejected or failed the request
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// HTTP transport failure
    #[error("telemetry http: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload failed to serialize
    #[error("telemetry serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Allowlist file was unreadable or malformed
    #[error("allowlist: {0}")]
    Allowlist(String),

    /// A histogram report failed its arithmetic consistency check
    #[error("histogram '{name}': {reason}")]
    InconsistentHistogram { name: String, reason: String },
}

impl TelemetryError {
    /// Whether the pipeline continues after this error (it always does)
    pub fn recoverable(&self) -> bool {
        true
    }
}
