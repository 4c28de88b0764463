//! Sieve Runtime - the per-filter lifecycle supervisor
//!
//! A filter is user code implementing the [`Filter`] capability trait:
//! `setup`, `process`, `shutdown` and a list of declared metric specs. The
//! runtime holds values of this trait, wires their sources and outputs,
//! and drives the state machine:
//!
//! ```text
//! Init ──▶ SettingUp ──▶ Running ──▶ Draining ──▶ ShuttingDown ──▶ Terminated
//!              │             │                         ▲
//!              └── setup_err ┴───────── fatal ─────────┘
//! ```
//!
//! # Concurrency model
//!
//! User calls run on a dedicated executor thread, one command at a time:
//! `process` never runs concurrently with itself. Transport, telemetry and
//! the synchronizer run as background tasks on the supervisor's runtime.
//! The executor-thread split is what lets the supervisor enforce the drain
//! deadline against a `process` call that will not return: it stops
//! waiting, runs the shutdown path, and leaves the stuck call behind on
//! the detached thread.

mod exec;
mod error;
mod filter;
mod runner;
mod stamp;
mod state;

pub use error::LifecycleError;
pub use exec::FilterExecutor;
pub use filter::{Filter, FilterContext};
pub use runner::{run_filter, FilterOutcome, RunnerEnv, StopReason};
pub use stamp::Pacer;
pub use state::{ExitStatus, FilterState, StateMachine};

// Re-exports user filters commonly need
pub use sieve_config::FilterConfig;
pub use sieve_metrics::{Extract, MetricSpec};
pub use sieve_protocol::{Data, DataMap, Frame, Image, PixelFormat};
pub use sieve_routing::Tick;

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

// Test modules - only compiled during testing
#[cfg(test)]
mod runner_test;
