//! The Filter capability trait
//!
//! User code implements this; the runtime owns the value and calls the
//! hooks from its executor thread. All hooks are synchronous from the
//! runtime's view: they return when done.

use anyhow::Result;
use sieve_config::FilterConfig;
use sieve_metrics::MetricSpec;
use sieve_protocol::{DataMap, Frame};
use sieve_routing::Tick;

/// Per-instance context handed to every hook
///
/// The `store` map is filter-private scratch state that survives across
/// ticks; the runtime never reads it.
#[derive(Debug, Clone)]
pub struct FilterContext {
    /// Filter instance id, unique within the run
    pub id: String,
    /// Filter kind name
    pub kind: String,
    /// Run id shared by every filter in the launch
    pub run_id: String,
    /// The resolved, frozen configuration
    pub config: FilterConfig,
    /// Scratch data store
    pub store: DataMap,
}

impl FilterContext {
    /// Build a context from a resolved config
    pub fn new(config: FilterConfig, run_id: impl Into<String>) -> Self {
        Self {
            id: config.id.clone(),
            kind: config.kind.clone(),
            run_id: run_id.into(),
            config,
            store: DataMap::new(),
        }
    }
}

/// User-implemented filter behavior
///
/// `process` is called once per synchronized tick and returns the frames
/// to publish; their `meta.topic` selects the output routing rule. The
/// runtime guarantees `process` never runs concurrently with itself.
pub trait Filter: Send {
    /// Metrics this filter declares; recorded each tick by the registry
    fn metric_specs(&self) -> Vec<MetricSpec> {
        Vec::new()
    }

    /// One-time initialization after sockets are wired
    fn setup(&mut self, _ctx: &mut FilterContext) -> Result<()> {
        Ok(())
    }

    /// Transform one tick of frames
    fn process(&mut self, ctx: &mut FilterContext, tick: &Tick) -> Result<Vec<Frame>>;

    /// Cleanup on the way out
    ///
    /// `was_killed` is true when the drain deadline expired and the
    /// supervisor is exiting without waiting for in-flight work.
    fn shutdown(&mut self, _ctx: &mut FilterContext, _was_killed: bool) -> Result<()> {
        Ok(())
    }
}
