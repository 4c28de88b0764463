//! Sieve Metrics - the observability substrate
//!
//! # Overview
//!
//! This crate provides:
//! - Declarative [`MetricSpec`]s (counter / histogram / gauge) with
//!   extractors over frame metadata
//! - A per-filter [`MetricRegistry`] owning the aggregation instruments
//! - Allowlist enforcement: only metric names matching the active pattern
//!   set ever leave the process; the empty allowlist exports nothing
//! - A background exporter (console or OTLP-HTTP) with retry backoff
//! - A lineage client emitting OpenLineage-shaped run events and periodic
//!   heartbeats with aggregated facets
//!
//! # Design Principles
//!
//! - **Single writer**: the supervisor observes ticks; the exporter reads
//!   snapshots under a short-critical-section mutex
//! - **Never block the pipeline**: export and lineage I/O run on
//!   background tasks; failures retry with backoff and are never fatal
//! - **Lock-down by default**: with no configured allowlist, nothing is
//!   exported
//!
//! # Observation flow
//!
//! ```text
//! process tick ──▶ MetricRegistry::observe (extract_fn per spec)
//!                        │ snapshot (mutex, short)
//!                        ▼
//!               exporter task ── allowlist ──▶ console / OTLP-HTTP
//!                        │
//!                        └────── lineage heartbeat facets ──▶ HTTP POST
//! ```

mod allowlist;
mod error;
mod exporter;
mod histogram;
mod lineage;
mod registry;
mod spec;
mod system;

pub use allowlist::Allowlist;
pub use error::TelemetryError;
pub use exporter::{
    spawn_exporter, ConsoleExporter, ExportBatch, Exporter, ExporterKind, HttpExporter,
    TelemetryConfig,
};
pub use histogram::{auto_bounds, Histogram, HistogramSnapshot};
pub use lineage::{
    build_facets, histogram_facet, spawn_heartbeat, LineageClient, LineageConfig, RunEventKind,
};
pub use registry::{MetricRegistry, MetricsSnapshot, RawSample};
pub use spec::{ExportMode, Extract, MetricKind, MetricSpec, MetricTarget};
pub use system::{SystemSample, SystemSampler};

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Default aggregation export interval
pub const DEFAULT_EXPORT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

/// Default lineage heartbeat interval
pub const DEFAULT_HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

/// Raw samples retained between exports (drop-oldest past this)
pub const RAW_RETENTION: usize = 100;

// Test modules - only compiled during testing
#[cfg(test)]
mod allowlist_test;
#[cfg(test)]
mod histogram_test;
#[cfg(test)]
mod lineage_test;
#[cfg(test)]
mod registry_test;
