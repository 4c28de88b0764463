//! Logging bootstrap for launcher processes

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber once per process
///
/// The level comes from `LOG_LEVEL` (default `info`); per-component
/// overrides use the usual `EnvFilter` directive syntax. Calling this
/// twice is harmless: the second init is ignored.
///
/// Per-filter attribution does not come from here: every worker runs its
/// whole life inside a `filter` span carrying `filter_id` and `run_id`
/// (established in the runtime's supervisor), and the fmt layer prints
/// span fields on every nested line. With several filters sharing one
/// process, that span is what tells their output apart.
pub fn init_logging() {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}
