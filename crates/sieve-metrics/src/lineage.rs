//! Lineage client - run events and heartbeat facets
//!
//! Emits OpenLineage-shaped events over HTTP: `START` when the filter
//! enters `Running`, `COMPLETE` on clean shutdown, `FAIL` on fatal error,
//! and a periodic heartbeat carrying the aggregated facets keyed by metric
//! name. All I/O is fire-and-forget; lineage can never stall the pipeline.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument, Span};

use crate::allowlist::Allowlist;
use crate::histogram::HistogramSnapshot;
use crate::registry::MetricRegistry;
use crate::spec::MetricTarget;
use crate::DEFAULT_HEARTBEAT_INTERVAL;

/// Producer string stamped on every event
const PRODUCER: &str = concat!("sieve-runtime/", env!("CARGO_PKG_VERSION"));

/// Job namespace for all filters
const NAMESPACE: &str = "sieve";

/// Lineage run event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEventKind {
    Start,
    Complete,
    Fail,
    /// Periodic facet refresh
    Heartbeat,
}

impl RunEventKind {
    fn as_str(self) -> &'static str {
        match self {
            RunEventKind::Start => "START",
            RunEventKind::Complete => "COMPLETE",
            RunEventKind::Fail => "FAIL",
            RunEventKind::Heartbeat => "RUNNING",
        }
    }
}

/// Lineage emitter configuration, usually read from the environment
#[derive(Debug, Clone)]
pub struct LineageConfig {
    /// Base URL (`LINEAGE_URL`); unset disables the emitter
    pub url: Option<String>,
    /// Event path on the server (`LINEAGE_ENDPOINT`)
    pub endpoint: String,
    /// Bearer token (`LINEAGE_API_KEY`)
    pub api_key: Option<String>,
    /// Heartbeat interval (`LINEAGE_HEARTBEAT_S`)
    pub heartbeat: Duration,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            url: None,
            endpoint: "/api/v1/lineage".to_string(),
            api_key: None,
            heartbeat: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl LineageConfig {
    /// Read the lineage environment variables
    pub fn from_env() -> Self {
        let url = env::var("LINEAGE_URL").ok().filter(|v| !v.is_empty());
        let endpoint =
            env::var("LINEAGE_ENDPOINT").unwrap_or_else(|_| "/api/v1/lineage".to_string());
        let api_key = env::var("LINEAGE_API_KEY").ok().filter(|v| !v.is_empty());
        let heartbeat = env::var("LINEAGE_HEARTBEAT_S")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);
        Self {
            url,
            endpoint,
            api_key,
            heartbeat,
        }
    }

    /// True when a URL is configured
    pub fn enabled(&self) -> bool {
        self.url.is_some()
    }
}

/// Build the heartbeat facet map from a registry snapshot
///
/// Counters and gauges become plain numbers keyed by name; histograms
/// become `<name>_histogram` objects with `{buckets, counts, count, sum}`.
/// The bucket arithmetic (`len(counts) == len(buckets) + 1`) is enforced;
/// inconsistent reports are skipped with a warning.
pub fn build_facets(registry: &MetricRegistry, allowlist: &Allowlist) -> Map<String, Value> {
    let snapshot = registry.snapshot();
    let mut facets = Map::new();

    let wants_lineage = |name: &str| {
        !matches!(registry.target_of(name), Some(MetricTarget::Otel))
    };

    for (name, value) in snapshot.counters {
        if allowlist.check(&name) && wants_lineage(&name) {
            facets.insert(name, json!(value));
        }
    }
    for (name, value) in snapshot.gauges {
        if allowlist.check(&name) && wants_lineage(&name) {
            facets.insert(name, json!(value));
        }
    }
    for (name, value) in snapshot.system {
        if allowlist.check(&name) {
            facets.insert(name, json!(value));
        }
    }
    for (name, histogram) in snapshot.histograms {
        if !allowlist.check(&name) || !wants_lineage(&name) {
            continue;
        }
        if let Some(facet) = histogram_facet(&name, &histogram) {
            facets.insert(format!("{name}_histogram"), facet);
        }
    }
    facets
}

/// Convert one histogram snapshot into its facet form
pub fn histogram_facet(name: &str, histogram: &HistogramSnapshot) -> Option<Value> {
    if !histogram.consistent(name) {
        return None;
    }
    Some(json!({
        "buckets": histogram.bounds,
        "counts": histogram.counts,
        "count": histogram.count,
        "sum": histogram.sum,
    }))
}

/// OpenLineage event emitter for one filter
pub struct LineageClient {
    config: LineageConfig,
    client: reqwest::Client,
    run_id: String,
    job_name: String,
}

impl LineageClient {
    /// Create a client for one filter's run
    pub fn new(config: LineageConfig, run_id: impl Into<String>, job_name: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            run_id: run_id.into(),
            job_name: job_name.into(),
        }
    }

    /// True when a lineage URL is configured
    pub fn enabled(&self) -> bool {
        self.config.enabled()
    }

    /// Build one event document
    pub fn event(&self, kind: RunEventKind, facets: Map<String, Value>) -> Value {
        json!({
            "eventType": kind.as_str(),
            "eventTime": chrono::Utc::now().to_rfc3339(),
            "run": {
                "runId": self.run_id,
                "facets": facets,
            },
            "job": {
                "namespace": NAMESPACE,
                "name": self.job_name,
            },
            "producer": PRODUCER,
        })
    }

    /// Emit one event, fire-and-forget
    pub fn emit(&self, kind: RunEventKind, facets: Map<String, Value>) {
        let Some(url) = self.config.url.clone() else {
            debug!(kind = kind.as_str(), "lineage disabled, event dropped");
            return;
        };
        let event = self.event(kind, facets);
        let target = format!(
            "{}{}",
            url.trim_end_matches('/'),
            self.config.endpoint
        );
        let client = self.client.clone();
        let api_key = self.config.api_key.clone();

        let post = async move {
            let mut request = client.post(&target).json(&event);
            if let Some(key) = api_key {
                request = request.bearer_auth(key);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    debug!(status = %response.status(), "lineage event rejected");
                }
                Err(e) => {
                    debug!(error = %e, "lineage event failed");
                }
            }
        };
        tokio::spawn(post.instrument(Span::current()));
    }

    /// Emit the `START` event
    pub fn emit_start(&self) {
        self.emit(RunEventKind::Start, Map::new());
    }

    /// Emit the `COMPLETE` event
    pub fn emit_complete(&self) {
        self.emit(RunEventKind::Complete, Map::new());
    }

    /// Emit the `FAIL` event with a reason facet
    pub fn emit_fail(&self, reason: &str) {
        let mut facets = Map::new();
        facets.insert("failureReason".to_string(), json!(reason));
        self.emit(RunEventKind::Fail, facets);
    }
}

/// Spawn the heartbeat task
///
/// Every interval the current aggregated facets are emitted as a
/// `RUNNING` event. Runs until cancelled.
pub fn spawn_heartbeat(
    client: Arc<LineageClient>,
    registry: Arc<MetricRegistry>,
    allowlist: Arc<Allowlist>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let task = async move {
        if !client.enabled() {
            debug!("lineage disabled, heartbeat idle");
            return;
        }
        let mut ticker = tokio::time::interval(client.config.heartbeat);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let facets = build_facets(&registry, &allowlist);
                    if facets.is_empty() {
                        continue;
                    }
                    client.emit(RunEventKind::Heartbeat, facets);
                }
                _ = cancel.cancelled() => break,
            }
        }
    };
    tokio::spawn(task.instrument(Span::current()))
}
