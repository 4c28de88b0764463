//! Histogram aggregation
//!
//! Buckets follow the usual convention: `counts` has one more entry than
//! `bounds`, the last bucket being open-ended. The lineage bridge depends
//! on that arithmetic, so it is enforced structurally here and re-checked
//! at facet time.

use tracing::warn;

/// Auto-generated boundaries for a histogram without explicit bounds
///
/// Semantic defaults key off the metric name: anything mentioning
/// `confidence`, `ratio` or `score` gets a linear [0, 1] split; everything
/// else gets logarithmic boundaries from 0.01 to 10 000.
pub fn auto_bounds(name: &str, bucket_count: usize) -> Vec<f64> {
    let n = bucket_count.max(1);
    let lower = name.to_ascii_lowercase();
    if ["confidence", "ratio", "score"]
        .iter()
        .any(|hint| lower.contains(hint))
    {
        // n boundaries splitting [0, 1] evenly, ending at 1.0.
        return (1..=n).map(|i| i as f64 / n as f64).collect();
    }

    // Logarithmic from 0.01 to 10_000.
    let (min, max) = (0.01f64, 10_000.0f64);
    let step = (max / min).powf(1.0 / (n as f64 - 1.0).max(1.0));
    (0..n).map(|i| min * step.powi(i as i32)).collect()
}

/// A recorded distribution
#[derive(Debug, Clone)]
pub struct Histogram {
    bounds: Vec<f64>,
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    /// Create a histogram with the given boundaries
    ///
    /// Boundaries are sorted; `counts` gets `bounds.len() + 1` buckets, the
    /// last one open-ended.
    pub fn new(mut bounds: Vec<f64>) -> Self {
        bounds.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        bounds.dedup();
        let buckets = bounds.len() + 1;
        Self {
            bounds,
            counts: vec![0; buckets],
            sum: 0.0,
            count: 0,
        }
    }

    /// Record one value
    pub fn record(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let bucket = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        self.counts[bucket] += 1;
        self.count += 1;
        self.sum += value;
    }

    /// Bucket boundaries
    #[inline]
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Per-bucket counts (`bounds.len() + 1` entries)
    #[inline]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Total recorded values
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of recorded values
    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Copy out the current state
    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            bounds: self.bounds.clone(),
            counts: self.counts.clone(),
            sum: self.sum,
            count: self.count,
        }
    }
}

/// Point-in-time histogram state
#[derive(Debug, Clone, serde::Serialize)]
pub struct HistogramSnapshot {
    pub bounds: Vec<f64>,
    pub counts: Vec<u64>,
    pub sum: f64,
    pub count: u64,
}

impl HistogramSnapshot {
    /// Verify the bucket arithmetic the lineage bridge relies on
    ///
    /// `len(counts) == len(bounds) + 1` and `sum(counts) == count`. A
    /// violation is logged and reported so the caller can skip the facet.
    pub fn consistent(&self, name: &str) -> bool {
        let shape_ok = self.counts.len() == self.bounds.len() + 1;
        let total_ok = self.counts.iter().sum::<u64>() == self.count;
        if !shape_ok || !total_ok {
            warn!(
                metric = name,
                bounds = self.bounds.len(),
                counts = self.counts.len(),
                count = self.count,
                "inconsistent histogram report"
            );
            return false;
        }
        true
    }
}
