//! Tests for lineage events and heartbeat facets

use std::sync::Arc;

use sieve_protocol::DataMap;

use crate::allowlist::Allowlist;
use crate::histogram::Histogram;
use crate::lineage::{build_facets, histogram_facet, LineageClient, LineageConfig, RunEventKind};
use crate::registry::MetricRegistry;
use crate::spec::{Extract, MetricSpec, MetricTarget};

fn observed_registry() -> MetricRegistry {
    let registry = MetricRegistry::new(vec![
        MetricSpec::counter("frames_total", Extract::path("count")),
        MetricSpec::histogram("confidence", Extract::path("confidence"))
            .with_bounds(vec![0.5, 1.0]),
    ]);
    let mut data = DataMap::new();
    data.insert("count", 1i64);
    data.insert("confidence", 0.8f64);
    registry.observe(&data);
    registry
}

// =============================================================================
// Event documents
// =============================================================================

#[test]
fn test_event_shape() {
    let client = LineageClient::new(LineageConfig::default(), "run-42", "detector");
    let event = client.event(RunEventKind::Start, serde_json::Map::new());

    assert_eq!(event["eventType"], "START");
    assert_eq!(event["run"]["runId"], "run-42");
    assert_eq!(event["job"]["namespace"], "sieve");
    assert_eq!(event["job"]["name"], "detector");
    assert!(event["eventTime"].as_str().unwrap().contains('T'));
    assert!(event["producer"]
        .as_str()
        .unwrap()
        .starts_with("sieve-runtime/"));
}

#[test]
fn test_event_kinds() {
    let client = LineageClient::new(LineageConfig::default(), "r", "j");
    for (kind, tag) in [
        (RunEventKind::Start, "START"),
        (RunEventKind::Complete, "COMPLETE"),
        (RunEventKind::Fail, "FAIL"),
        (RunEventKind::Heartbeat, "RUNNING"),
    ] {
        assert_eq!(client.event(kind, serde_json::Map::new())["eventType"], tag);
    }
}

#[test]
fn test_disabled_without_url() {
    let client = LineageClient::new(LineageConfig::default(), "r", "j");
    assert!(!client.enabled());
}

// =============================================================================
// Histogram facets
// =============================================================================

#[test]
fn test_histogram_facet_arithmetic() {
    let mut histogram = Histogram::new(vec![0.5, 1.0]);
    for value in [0.2, 0.7, 0.9, 5.0] {
        histogram.record(value);
    }
    let facet = histogram_facet("confidence", &histogram.snapshot()).unwrap();

    let buckets = facet["buckets"].as_array().unwrap();
    let counts = facet["counts"].as_array().unwrap();
    // One more count than boundaries: the open-ended upper bin.
    assert_eq!(counts.len(), buckets.len() + 1);
    assert_eq!(facet["count"], 4);
    let total: u64 = counts.iter().map(|c| c.as_u64().unwrap()).sum();
    assert_eq!(total, 4);
}

#[test]
fn test_inconsistent_facet_skipped() {
    let mut histogram = Histogram::new(vec![0.5]);
    histogram.record(0.2);
    let mut snapshot = histogram.snapshot();
    snapshot.counts.push(99);
    assert!(histogram_facet("broken", &snapshot).is_none());
}

// =============================================================================
// Facet building
// =============================================================================

#[test]
fn test_build_facets_keys() {
    let registry = observed_registry();
    let allowlist = Allowlist::new(vec!["*".into()]);

    let facets = build_facets(&registry, &allowlist);
    assert_eq!(facets["frames_total"], 1.0);
    assert!(facets.contains_key("confidence_histogram"));
    assert!(!facets.contains_key("confidence"));
}

#[test]
fn test_build_facets_respects_allowlist() {
    let registry = observed_registry();
    let allowlist = Allowlist::new(vec!["frames_*".into()]);

    let facets = build_facets(&registry, &allowlist);
    assert!(facets.contains_key("frames_total"));
    assert!(!facets.contains_key("confidence_histogram"));
}

#[test]
fn test_otel_only_metric_skips_lineage() {
    let registry = MetricRegistry::new(vec![MetricSpec::counter(
        "otel_only",
        Extract::path("count"),
    )
    .with_target(MetricTarget::Otel)]);
    let mut data = DataMap::new();
    data.insert("count", 1i64);
    registry.observe(&data);

    let allowlist = Allowlist::new(vec!["*".into()]);
    let facets = build_facets(&registry, &allowlist);
    assert!(facets.is_empty());
}

#[test]
fn test_system_metrics_appear_in_facets() {
    let registry = observed_registry();
    registry.record_system("fps", 30.0);

    let allowlist = Allowlist::new(vec!["fps".into()]);
    let facets = build_facets(&registry, &Arc::new(allowlist));
    assert_eq!(facets["fps"], 30.0);
    assert_eq!(facets.len(), 1);
}
