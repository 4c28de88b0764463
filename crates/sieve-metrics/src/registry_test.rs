//! Tests for the metric registry and export gating

use std::sync::Arc;

use sieve_protocol::{Data, DataMap};

use crate::allowlist::Allowlist;
use crate::exporter::gate_snapshot;
use crate::registry::MetricRegistry;
use crate::spec::{ExportMode, Extract, MetricSpec, MetricTarget};
use crate::RAW_RETENTION;

fn data(count: i64, confidence: f64) -> DataMap {
    let mut data = DataMap::new();
    data.insert("count", count);
    data.insert("confidence", confidence);
    data
}

fn registry() -> MetricRegistry {
    MetricRegistry::new(vec![
        MetricSpec::counter("frames_total", Extract::path("count")),
        MetricSpec::histogram("confidence", Extract::path("confidence")),
        MetricSpec::gauge("last_count", Extract::path("count")),
    ])
}

// =============================================================================
// Observation
// =============================================================================

#[test]
fn test_counter_accumulates() {
    let registry = registry();
    registry.observe(&data(2, 0.5));
    registry.observe(&data(3, 0.7));

    let snapshot = registry.snapshot();
    let (_, total) = snapshot
        .counters
        .iter()
        .find(|(name, _)| name == "frames_total")
        .unwrap();
    assert_eq!(*total, 5.0);
}

#[test]
fn test_gauge_keeps_latest() {
    let registry = registry();
    registry.observe(&data(2, 0.5));
    registry.observe(&data(9, 0.5));

    let snapshot = registry.snapshot();
    let (_, latest) = snapshot
        .gauges
        .iter()
        .find(|(name, _)| name == "last_count")
        .unwrap();
    assert_eq!(*latest, 9.0);
}

#[test]
fn test_histogram_records() {
    let registry = registry();
    for confidence in [0.1, 0.5, 0.9] {
        registry.observe(&data(1, confidence));
    }

    let snapshot = registry.snapshot();
    let (_, histogram) = snapshot
        .histograms
        .iter()
        .find(|(name, _)| name == "confidence")
        .unwrap();
    assert_eq!(histogram.count, 3);
    assert!(histogram.consistent("confidence"));
}

#[test]
fn test_missing_value_skips_recording() {
    let registry = registry();
    // No 'count' key at all: extractors return None, nothing records.
    let mut empty = DataMap::new();
    empty.insert("unrelated", Data::Str("x".into()));
    registry.observe(&empty);

    let snapshot = registry.snapshot();
    let (_, total) = snapshot
        .counters
        .iter()
        .find(|(name, _)| name == "frames_total")
        .unwrap();
    assert_eq!(*total, 0.0);
    assert!(snapshot.gauges.is_empty());
}

#[test]
fn test_system_metrics_recorded_separately() {
    let registry = registry();
    registry.record_system("fps", 29.7);
    registry.record_system("cpu_percent", 12.0);
    registry.record_system("fps", 30.1);

    let snapshot = registry.snapshot();
    assert_eq!(
        snapshot.system,
        vec![("cpu_percent".to_string(), 12.0), ("fps".to_string(), 30.1)]
    );
}

// =============================================================================
// Raw retention
// =============================================================================

#[test]
fn test_raw_ring_bounded_drop_oldest() {
    let registry = MetricRegistry::new(vec![MetricSpec::counter(
        "frames_total",
        Extract::path("count"),
    )
    .with_export(ExportMode::Both)]);

    for i in 0..(RAW_RETENTION + 20) {
        registry.observe(&data(i as i64, 0.0));
    }

    let raw = registry.drain_raw();
    assert_eq!(raw.len(), RAW_RETENTION);
    // Oldest samples were dropped: the first retained one is sample 20.
    assert_eq!(raw[0].value, 20.0);
    // Drained: the ring is empty now.
    assert!(registry.drain_raw().is_empty());
}

#[test]
fn test_aggregated_specs_record_no_raw() {
    let registry = registry();
    registry.observe(&data(1, 0.5));
    assert!(registry.drain_raw().is_empty());
}

// =============================================================================
// Export gating (S5 shape)
// =============================================================================

#[test]
fn test_allowlist_gates_export() {
    let registry = MetricRegistry::new(vec![
        MetricSpec::counter("foo_counter", Extract::path("count")),
        MetricSpec::histogram("bar_histogram", Extract::path("confidence")),
    ]);
    registry.observe(&data(1, 0.5));

    let allowlist = Arc::new(Allowlist::new(vec!["foo_*".into()]));
    let batch = gate_snapshot("f0", "run-1", &registry, &allowlist);

    assert_eq!(batch.counters.len(), 1);
    assert_eq!(batch.counters[0].0, "foo_counter");
    assert!(batch.histograms.is_empty(), "bar_histogram must be blocked");
}

#[test]
fn test_empty_allowlist_exports_nothing() {
    let registry = registry();
    registry.observe(&data(1, 0.5));
    registry.record_system("fps", 30.0);

    let allowlist = Arc::new(Allowlist::locked_down());
    let batch = gate_snapshot("f0", "run-1", &registry, &allowlist);
    assert!(batch.is_empty());
}

#[test]
fn test_lineage_only_metric_not_exported_to_otel() {
    let registry = MetricRegistry::new(vec![MetricSpec::counter(
        "private_counter",
        Extract::path("count"),
    )
    .with_target(MetricTarget::Lineage)]);
    registry.observe(&data(1, 0.5));

    let allowlist = Arc::new(Allowlist::new(vec!["*".into()]));
    let batch = gate_snapshot("f0", "run-1", &registry, &allowlist);
    assert!(batch.counters.is_empty());
}

#[test]
fn test_raw_mode_skips_aggregated_export() {
    let registry = MetricRegistry::new(vec![MetricSpec::counter(
        "raw_counter",
        Extract::path("count"),
    )
    .with_export(ExportMode::Raw)]);
    registry.observe(&data(1, 0.5));

    let allowlist = Arc::new(Allowlist::new(vec!["*".into()]));
    let batch = gate_snapshot("f0", "run-1", &registry, &allowlist);
    assert!(batch.counters.is_empty());
    assert_eq!(batch.raw.len(), 1);
    assert_eq!(batch.raw[0].name, "raw_counter");
}
