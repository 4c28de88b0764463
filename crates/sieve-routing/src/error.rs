//! Synchronization error types

use std::time::Duration;

use thiserror::Error;

/// Errors raised while assembling ticks
///
/// Sync errors are recoverable: they are logged at WARN and the
/// synchronizer advances past the missing topic per the configured mode.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A strict tick waited past the window with topics still missing
    #[error("tick deadline exceeded after {waited:?}, missing topic '{topic}'")]
    TickDeadline { topic: String, waited: Duration },

    /// A by-id orphan expired without ever matching
    #[error("frame id {id} on topic '{topic}' expired unmatched")]
    OrphanExpired { topic: String, id: i64 },

    /// The intake channel closed while topics were still live
    #[error("synchronizer intake closed")]
    IntakeClosed,
}

impl SyncError {
    /// Whether the pipeline continues after this error (it always does)
    pub fn recoverable(&self) -> bool {
        true
    }
}
