//! MetricSpec - declarative metric definitions
//!
//! Filters declare what to measure as plain values; the registry owns the
//! instruments. Extractors read the per-topic metadata bundle and return
//! `None` to skip recording, so invalid metadata never crashes a tick.

use std::fmt;
use std::sync::Arc;

use sieve_protocol::{Data, DataMap};

/// Instrument kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonic accumulator
    Counter,
    /// Bucketed distribution
    Histogram,
    /// Latest value wins
    Gauge,
}

/// What leaves the process at export time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// Each recorded value as-is
    Raw,
    /// Counter sums and histogram buckets
    #[default]
    Aggregated,
    /// Both raw and aggregated
    Both,
}

/// Which backends receive the metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricTarget {
    /// Telemetry exporter only
    Otel,
    /// Lineage heartbeat facets only
    Lineage,
    /// Both backends
    #[default]
    Both,
}

/// Value extraction from a metadata bundle
///
/// The declarative `Path` form covers the common cases and survives
/// serialization; `Func` is for anything a path cannot express.
#[derive(Clone)]
pub enum Extract {
    /// Dotted path into the metadata map. A trailing `length` segment
    /// counts a list or string, e.g. `plates.length`.
    Path(String),
    /// Arbitrary extraction function
    Func(Arc<dyn Fn(&DataMap) -> Option<f64> + Send + Sync>),
}

impl Extract {
    /// Shorthand for the path form
    pub fn path(path: impl Into<String>) -> Self {
        Extract::Path(path.into())
    }

    /// Shorthand for the function form
    pub fn func(f: impl Fn(&DataMap) -> Option<f64> + Send + Sync + 'static) -> Self {
        Extract::Func(Arc::new(f))
    }

    /// Apply the extractor; `None` means "do not record"
    pub fn apply(&self, data: &DataMap) -> Option<f64> {
        match self {
            Extract::Func(f) => f(data),
            Extract::Path(path) => extract_path(data, path),
        }
    }
}

impl fmt::Debug for Extract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extract::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Extract::Func(_) => f.write_str("Func(..)"),
        }
    }
}

fn numeric(value: &Data) -> Option<f64> {
    match value {
        Data::Int(n) => Some(*n as f64),
        Data::Float(x) => Some(*x),
        Data::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn extract_path(data: &DataMap, path: &str) -> Option<f64> {
    let mut current: Option<&Data> = None;
    let mut map = Some(data);

    for segment in path.split('.') {
        // `length` against the current value counts instead of descending.
        if segment == "length" {
            let target = match (current, map) {
                (Some(value), _) => value,
                (None, Some(m)) => return Some(m.len() as f64),
                _ => return None,
            };
            return match target {
                Data::List(items) => Some(items.len() as f64),
                Data::Str(s) => Some(s.len() as f64),
                Data::Map(m) => Some(m.len() as f64),
                _ => None,
            };
        }

        let value = map?.get(segment)?;
        current = Some(value);
        map = value.as_map();
    }

    numeric(current?)
}

/// Declarative description of one metric
///
/// # Example
///
/// ```
/// use sieve_metrics::{Extract, MetricSpec};
///
/// let specs = vec![
///     MetricSpec::counter("frames_with_plate", Extract::path("plates.length")),
///     MetricSpec::histogram("plate_confidence", Extract::path("confidence")),
/// ];
/// ```
#[derive(Debug, Clone)]
pub struct MetricSpec {
    /// Exported metric name
    pub name: String,
    /// Instrument kind
    pub kind: MetricKind,
    /// Value extraction from the metadata bundle
    pub extract: Extract,
    /// Explicit histogram bucket boundaries
    pub bounds: Option<Vec<f64>>,
    /// Boundary count when bounds are auto-generated
    pub bucket_count: usize,
    /// Raw vs aggregated export
    pub export: ExportMode,
    /// Telemetry, lineage, or both
    pub target: MetricTarget,
}

impl MetricSpec {
    fn new(name: impl Into<String>, kind: MetricKind, extract: Extract) -> Self {
        Self {
            name: name.into(),
            kind,
            extract,
            bounds: None,
            bucket_count: 10,
            export: ExportMode::default(),
            target: MetricTarget::default(),
        }
    }

    /// A counter spec
    pub fn counter(name: impl Into<String>, extract: Extract) -> Self {
        Self::new(name, MetricKind::Counter, extract)
    }

    /// A histogram spec
    pub fn histogram(name: impl Into<String>, extract: Extract) -> Self {
        Self::new(name, MetricKind::Histogram, extract)
    }

    /// A gauge spec
    pub fn gauge(name: impl Into<String>, extract: Extract) -> Self {
        Self::new(name, MetricKind::Gauge, extract)
    }

    /// Set explicit histogram bounds
    #[must_use]
    pub fn with_bounds(mut self, bounds: Vec<f64>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Set the auto-generated boundary count
    #[must_use]
    pub fn with_bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = count.max(1);
        self
    }

    /// Set the export mode
    #[must_use]
    pub fn with_export(mut self, export: ExportMode) -> Self {
        self.export = export;
        self
    }

    /// Set the target backends
    #[must_use]
    pub fn with_target(mut self, target: MetricTarget) -> Self {
        self.target = target;
        self
    }
}
