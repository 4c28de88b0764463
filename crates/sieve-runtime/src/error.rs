//! Lifecycle error types

use std::time::Duration;

use thiserror::Error;

/// Errors that end a filter's life
///
/// Lifecycle errors are fatal for the filter; the launcher observes them
/// as a failed child.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `user_setup` returned an error
    #[error("setup failed: {0}")]
    SetupFailed(#[source] anyhow::Error),

    /// Configuration did not normalize
    #[error(transparent)]
    Config(#[from] sieve_config::ConfigError),

    /// An output endpoint failed to bind
    #[error("output bind failed: {0}")]
    BindFailed(#[source] sieve_transport::TransportError),

    /// The drain deadline expired with work still in flight
    #[error("drain deadline of {deadline:?} exceeded")]
    DrainDeadline { deadline: Duration },

    /// `user_shutdown` returned an error
    #[error("shutdown failed: {0}")]
    ShutdownFailed(#[source] anyhow::Error),

    /// Repeated `user_process` failures escalated to fatal
    #[error("process failed {count} times within {window:?}")]
    ProcessEscalation { count: u32, window: Duration },

    /// The executor thread died
    #[error("filter executor gone")]
    ExecutorGone,
}

impl LifecycleError {
    /// Whether the pipeline continues after this error (it never does;
    /// lifecycle errors drive the filter to a failed exit)
    pub fn recoverable(&self) -> bool {
        false
    }
}
