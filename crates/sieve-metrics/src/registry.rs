//! MetricRegistry - per-filter instrument ownership
//!
//! The supervisor is the single writer: it observes each tick's metadata
//! against the declared specs. The background exporter takes snapshots
//! under the same short-critical-section mutex.

use std::collections::HashMap;

use parking_lot::Mutex;
use sieve_protocol::DataMap;

use crate::histogram::{auto_bounds, Histogram, HistogramSnapshot};
use crate::spec::{ExportMode, MetricKind, MetricSpec, MetricTarget};
use crate::RAW_RETENTION;

/// One raw (unaggregated) sample
#[derive(Debug, Clone, serde::Serialize)]
pub struct RawSample {
    pub name: String,
    pub value: f64,
    /// Wall time in nanoseconds since epoch
    pub ts: i64,
}

enum InstrumentState {
    Counter { total: f64 },
    Histogram(Histogram),
    Gauge { latest: Option<f64> },
}

struct Instrument {
    spec: MetricSpec,
    state: InstrumentState,
}

struct Inner {
    instruments: Vec<Instrument>,
    /// System metrics recorded by the supervisor sampler, not user specs
    system: HashMap<String, f64>,
    /// Bounded raw-sample ring for raw/both export modes; drained by the
    /// exporter, untouched by aggregated snapshots
    raw: std::collections::VecDeque<RawSample>,
}

/// Point-in-time registry state handed to exporters and the lineage bridge
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub counters: Vec<(String, f64)>,
    pub histograms: Vec<(String, HistogramSnapshot)>,
    pub gauges: Vec<(String, f64)>,
    pub system: Vec<(String, f64)>,
}

impl MetricsSnapshot {
    /// True when there is nothing to export
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.histograms.is_empty()
            && self.gauges.is_empty()
            && self.system.is_empty()
    }
}

/// Per-filter metric registry
pub struct MetricRegistry {
    inner: Mutex<Inner>,
}

impl MetricRegistry {
    /// Build instruments for the declared specs
    pub fn new(specs: Vec<MetricSpec>) -> Self {
        let instruments = specs
            .into_iter()
            .map(|spec| {
                let state = match spec.kind {
                    MetricKind::Counter => InstrumentState::Counter { total: 0.0 },
                    MetricKind::Gauge => InstrumentState::Gauge { latest: None },
                    MetricKind::Histogram => {
                        let bounds = spec
                            .bounds
                            .clone()
                            .unwrap_or_else(|| auto_bounds(&spec.name, spec.bucket_count));
                        InstrumentState::Histogram(Histogram::new(bounds))
                    }
                };
                Instrument { spec, state }
            })
            .collect();

        Self {
            inner: Mutex::new(Inner {
                instruments,
                system: HashMap::new(),
                raw: std::collections::VecDeque::new(),
            }),
        }
    }

    /// Number of declared instruments
    pub fn spec_count(&self) -> usize {
        self.inner.lock().instruments.len()
    }

    /// Observe one metadata bundle against every spec
    ///
    /// An extractor returning `None` skips recording; there is no failure
    /// path, invalid metadata is simply not recorded.
    pub fn observe(&self, data: &DataMap) {
        let ts = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let mut inner = self.inner.lock();
        // Split borrow: raw ring updates happen alongside instrument walks.
        let Inner {
            instruments, raw, ..
        } = &mut *inner;

        for instrument in instruments.iter_mut() {
            let Some(value) = instrument.spec.extract.apply(data) else {
                continue;
            };
            match &mut instrument.state {
                InstrumentState::Counter { total } => *total += value,
                InstrumentState::Histogram(histogram) => histogram.record(value),
                InstrumentState::Gauge { latest } => *latest = Some(value),
            }
            if matches!(instrument.spec.export, ExportMode::Raw | ExportMode::Both) {
                if raw.len() == RAW_RETENTION {
                    raw.pop_front();
                }
                raw.push_back(RawSample {
                    name: instrument.spec.name.clone(),
                    value,
                    ts,
                });
            }
        }
    }

    /// Record one system metric (cpu, memory, fps, latencies)
    ///
    /// These flow through the same allowlist as user metrics but are
    /// sampled by the supervisor rather than declared as specs.
    pub fn record_system(&self, name: &str, value: f64) {
        self.inner.lock().system.insert(name.to_string(), value);
    }

    /// Drain the raw-sample ring (exporter only, raw/both export modes)
    pub fn drain_raw(&self) -> Vec<RawSample> {
        self.inner.lock().raw.drain(..).collect()
    }

    /// Snapshot the aggregated state; the raw ring is left untouched
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut inner = self.inner.lock();
        let mut snapshot = MetricsSnapshot::default();

        for instrument in &inner.instruments {
            let name = instrument.spec.name.clone();
            match &instrument.state {
                InstrumentState::Counter { total } => snapshot.counters.push((name, *total)),
                InstrumentState::Histogram(histogram) => {
                    snapshot.histograms.push((name, histogram.snapshot()))
                }
                InstrumentState::Gauge { latest } => {
                    if let Some(value) = latest {
                        snapshot.gauges.push((name, *value));
                    }
                }
            }
        }
        for (name, value) in &inner.system {
            snapshot.system.push((name.clone(), *value));
        }
        snapshot.system.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Targets declared for a metric name, if it is a user spec
    pub fn target_of(&self, name: &str) -> Option<MetricTarget> {
        self.inner
            .lock()
            .instruments
            .iter()
            .find(|i| i.spec.name == name)
            .map(|i| i.spec.target)
    }

    /// Export mode declared for a metric name, if it is a user spec
    pub fn export_of(&self, name: &str) -> Option<ExportMode> {
        self.inner
            .lock()
            .instruments
            .iter()
            .find(|i| i.spec.name == name)
            .map(|i| i.spec.export)
    }
}
