//! Tests for histogram aggregation and auto bounds

use crate::histogram::{auto_bounds, Histogram};

// =============================================================================
// Recording
// =============================================================================

#[test]
fn test_bucket_placement() {
    let mut histogram = Histogram::new(vec![1.0, 5.0, 10.0]);
    histogram.record(0.5); // <= 1.0
    histogram.record(1.0); // <= 1.0 (inclusive upper bound)
    histogram.record(3.0); // <= 5.0
    histogram.record(100.0); // open-ended

    assert_eq!(histogram.counts(), &[2, 1, 0, 1]);
    assert_eq!(histogram.count(), 4);
    assert_eq!(histogram.sum(), 104.5);
}

#[test]
fn test_counts_has_one_more_bucket_than_bounds() {
    let histogram = Histogram::new(vec![1.0, 2.0, 3.0]);
    assert_eq!(histogram.counts().len(), histogram.bounds().len() + 1);
}

#[test]
fn test_non_finite_values_skipped() {
    let mut histogram = Histogram::new(vec![1.0]);
    histogram.record(f64::NAN);
    histogram.record(f64::INFINITY);
    assert_eq!(histogram.count(), 0);
}

#[test]
fn test_unsorted_bounds_are_sorted() {
    let histogram = Histogram::new(vec![10.0, 1.0, 5.0, 5.0]);
    assert_eq!(histogram.bounds(), &[1.0, 5.0, 10.0]);
}

// =============================================================================
// Snapshot consistency
// =============================================================================

#[test]
fn test_snapshot_is_consistent() {
    let mut histogram = Histogram::new(vec![1.0, 2.0]);
    for value in [0.5, 1.5, 2.5, 3.5] {
        histogram.record(value);
    }
    let snapshot = histogram.snapshot();
    assert!(snapshot.consistent("test"));
    assert_eq!(snapshot.counts.iter().sum::<u64>(), snapshot.count);
}

#[test]
fn test_tampered_snapshot_flagged() {
    let mut histogram = Histogram::new(vec![1.0, 2.0]);
    histogram.record(0.5);
    let mut snapshot = histogram.snapshot();
    snapshot.counts.pop();
    assert!(!snapshot.consistent("test"));
}

// =============================================================================
// Auto bounds
// =============================================================================

#[test]
fn test_confidence_gets_unit_interval() {
    let bounds = auto_bounds("plate_confidence", 10);
    assert_eq!(bounds.len(), 10);
    assert!(bounds.first().unwrap() > &0.0);
    assert_eq!(*bounds.last().unwrap(), 1.0);
    assert!(bounds.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_generic_gets_logarithmic() {
    let bounds = auto_bounds("processing_latency_ms", 8);
    assert_eq!(bounds.len(), 8);
    assert!((bounds[0] - 0.01).abs() < 1e-9);
    assert!((bounds[7] - 10_000.0).abs() < 1e-6);
    // Log spacing: successive ratios are equal.
    let ratio = bounds[1] / bounds[0];
    for window in bounds.windows(2) {
        assert!((window[1] / window[0] - ratio).abs() < 1e-6);
    }
}
