//! Sieve Launcher - running N filters as a supervised group
//!
//! `run_multi` spawns one isolated worker per `(kind, config)` node, all
//! correlated by a single `run_id`, and implements the three-knob
//! coordinated-exit protocol:
//!
//! - **propagate_exit**: when this filter terminates, siblings with
//!   `obey_exit` are stopped
//! - **obey_exit**: accept stop propagated from an exiting sibling
//! - **stop_exit**: counts toward the "pipeline done" quorum; once every
//!   such filter has terminated, everything remaining is stopped
//!
//! Workers are OS threads each owning a current-thread tokio runtime, so
//! a stuck worker can be abandoned without taking the launcher with it:
//! after `shutdown_grace` the launcher reports it as killed and exits.
//!
//! ```no_run
//! use sieve_launcher::{run_multi, FilterNode};
//!
//! # fn nodes() -> Vec<FilterNode> { Vec::new() }
//! let status = run_multi(nodes());
//! std::process::exit(status.exit_code());
//! ```

mod launcher;
mod logging;
mod node;
mod status;

pub use launcher::{run_multi, run_multi_with, LaunchOptions};
pub use logging::init_logging;
pub use node::FilterNode;
pub use status::{ChildReport, ChildStatus, LaunchStatus};

// Test modules - only compiled during testing
#[cfg(test)]
mod launcher_test;
