//! Sieve Routing - tick synchronization and output fan-out
//!
//! The input side of a filter merges frames from all its sources into a
//! [`Synchronizer`], which assembles **ticks**: the bundle of frames (one
//! per subscribed topic) that one `process` call observes.
//!
//! Synchronization modes:
//! - **Loose** (default): a tick is delivered as soon as any topic has a
//!   frame pending; missing topics are `None`
//! - **Strict**: a tick waits until every non-ephemeral topic has a frame;
//!   past the window it degrades to a partial tick with a warning
//! - **By-id**: frames are aligned across topics by `meta.id`; stragglers
//!   are dropped (counted) to reach the highest pending id
//!
//! Ephemeral topics contribute their latest frame (possibly stale) and
//! never block assembly.
//!
//! The output side is an [`OutputRouter`]: produced frames are matched
//! against each output's topic rewrites and fanned out to the matching
//! publish lanes. A produced topic matching no output rule is dropped with
//! a once-per-run warning.

mod error;
mod router;
mod sync;

pub use error::SyncError;
pub use router::{OutputRouter, RouterStats};
pub use sync::{SyncEvent, SyncStats, Synchronizer, SynchronizerConfig, Tick, TopicSpec};

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, SyncError>;

// Test modules - only compiled during testing
#[cfg(test)]
mod router_test;
