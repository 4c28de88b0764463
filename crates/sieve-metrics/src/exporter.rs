//! Background metric export
//!
//! A periodic task snapshots the registry, gates every name through the
//! allowlist, and ships the result to the configured backend. Failures
//! retry with exponential backoff; the pipeline never blocks on export.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use crate::allowlist::Allowlist;
use crate::error::TelemetryError;
use crate::histogram::HistogramSnapshot;
use crate::registry::{MetricRegistry, RawSample};
use crate::spec::{ExportMode, MetricTarget};
use crate::{Result, DEFAULT_EXPORT_INTERVAL};

/// Flush budget on shutdown; never extends total shutdown beyond grace
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Retry attempts per batch before it is dropped
const MAX_EXPORT_ATTEMPTS: u32 = 5;

/// Export backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExporterKind {
    /// Structured log lines (the development default)
    #[default]
    Console,
    /// JSON POST to an OTLP-HTTP collector
    OtlpHttp,
}

impl ExporterKind {
    /// Parse a `TELEMETRY_EXPORTER` value
    ///
    /// Backends this build does not speak (`otlp_grpc`, `prometheus`,
    /// `gcm`) fall back to console with a warning.
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "console" => ExporterKind::Console,
            "otlp_http" => ExporterKind::OtlpHttp,
            other @ ("otlp_grpc" | "prometheus" | "gcm") => {
                warn!(exporter = other, "exporter not supported, using console");
                ExporterKind::Console
            }
            other => {
                warn!(exporter = other, "unknown exporter, using console");
                ExporterKind::Console
            }
        }
    }
}

/// Telemetry configuration, usually read from the environment
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Master switch (`TELEMETRY_ENABLED`)
    pub enabled: bool,
    /// Backend (`TELEMETRY_EXPORTER`)
    pub kind: ExporterKind,
    /// Target URL (`TELEMETRY_ENDPOINT`)
    pub endpoint: Option<String>,
    /// Export interval (`EXPORT_INTERVAL_MS`)
    pub interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: ExporterKind::Console,
            endpoint: None,
            interval: DEFAULT_EXPORT_INTERVAL,
        }
    }
}

impl TelemetryConfig {
    /// Read the telemetry environment variables
    pub fn from_env() -> Self {
        let enabled = env::var("TELEMETRY_ENABLED")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);
        let kind = env::var("TELEMETRY_EXPORTER")
            .map(|v| ExporterKind::parse(&v))
            .unwrap_or_default();
        let endpoint = env::var("TELEMETRY_ENDPOINT").ok();
        let interval = env::var("EXPORT_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_EXPORT_INTERVAL);
        Self {
            enabled,
            kind,
            endpoint,
            interval,
        }
    }
}

/// One gated export payload
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExportBatch {
    pub ts: i64,
    pub filter_id: String,
    pub run_id: String,
    pub counters: Vec<(String, f64)>,
    pub histograms: Vec<(String, HistogramSnapshot)>,
    pub gauges: Vec<(String, f64)>,
    pub system: Vec<(String, f64)>,
    pub raw: Vec<RawSample>,
}

impl ExportBatch {
    /// True when the batch carries nothing
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.histograms.is_empty()
            && self.gauges.is_empty()
            && self.system.is_empty()
            && self.raw.is_empty()
    }
}

/// An export backend
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Ship one batch
    async fn export(&self, batch: &ExportBatch) -> Result<()>;
}

/// Logs batches as structured JSON lines
#[derive(Debug, Default)]
pub struct ConsoleExporter;

#[async_trait]
impl Exporter for ConsoleExporter {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn export(&self, batch: &ExportBatch) -> Result<()> {
        let payload = serde_json::to_string(batch)?;
        info!(target: "sieve::telemetry", %payload, "metrics export");
        Ok(())
    }
}

/// POSTs batches as JSON to an OTLP-HTTP collector
pub struct HttpExporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExporter {
    /// Create an exporter for the endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Exporter for HttpExporter {
    fn name(&self) -> &'static str {
        "otlp_http"
    }

    async fn export(&self, batch: &ExportBatch) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TelemetryError::ExportFailed(format!(
                "endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Build the batch for one interval: snapshot, gate, shape
pub(crate) fn gate_snapshot(
    filter_id: &str,
    run_id: &str,
    registry: &MetricRegistry,
    allowlist: &Allowlist,
) -> ExportBatch {
    let snapshot = registry.snapshot();
    let mut batch = ExportBatch {
        ts: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        filter_id: filter_id.to_string(),
        run_id: run_id.to_string(),
        ..ExportBatch::default()
    };

    let wants_otel = |name: &str| {
        !matches!(registry.target_of(name), Some(MetricTarget::Lineage))
    };
    let aggregated = |name: &str| {
        !matches!(registry.export_of(name), Some(ExportMode::Raw))
    };

    for (name, value) in snapshot.counters {
        if allowlist.check(&name) && wants_otel(&name) && aggregated(&name) {
            batch.counters.push((name, value));
        }
    }
    for (name, histogram) in snapshot.histograms {
        if allowlist.check(&name) && wants_otel(&name) && aggregated(&name) {
            batch.histograms.push((name, histogram));
        }
    }
    for (name, value) in snapshot.gauges {
        if allowlist.check(&name) && wants_otel(&name) && aggregated(&name) {
            batch.gauges.push((name, value));
        }
    }
    for (name, value) in snapshot.system {
        if allowlist.check(&name) {
            batch.system.push((name, value));
        }
    }
    for sample in registry.drain_raw() {
        if allowlist.check(&sample.name) && wants_otel(&sample.name) {
            batch.raw.push(sample);
        }
    }
    batch
}

async fn export_with_retry(exporter: &dyn Exporter, batch: &ExportBatch, cancel: &CancellationToken) {
    let mut delay = Duration::from_millis(500);
    for attempt in 1..=MAX_EXPORT_ATTEMPTS {
        match exporter.export(batch).await {
            Ok(()) => return,
            Err(e) if attempt == MAX_EXPORT_ATTEMPTS => {
                warn!(exporter = exporter.name(), error = %e, "export failed, dropping batch");
                return;
            }
            Err(e) => {
                debug!(exporter = exporter.name(), attempt, error = %e, "export failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return,
                }
                delay = (delay * 2).min(Duration::from_secs(10));
            }
        }
    }
}

/// Spawn the periodic export task
///
/// Runs until cancelled, then makes one final flush within a 2-second
/// budget so shutdown is never extended past the grace period.
pub fn spawn_exporter(
    filter_id: String,
    run_id: String,
    registry: Arc<MetricRegistry>,
    allowlist: Arc<Allowlist>,
    config: TelemetryConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let task = async move {
        if !config.enabled {
            debug!("telemetry disabled, exporter idle");
            return;
        }

        let exporter: Box<dyn Exporter> = match (config.kind, &config.endpoint) {
            (ExporterKind::OtlpHttp, Some(endpoint)) => Box::new(HttpExporter::new(endpoint)),
            (ExporterKind::OtlpHttp, None) => {
                warn!("otlp_http exporter has no TELEMETRY_ENDPOINT, using console");
                Box::new(ConsoleExporter)
            }
            (ExporterKind::Console, _) => Box::new(ConsoleExporter),
        };

        info!(
            exporter = exporter.name(),
            interval_ms = config.interval.as_millis() as u64,
            "metrics exporter running"
        );

        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // immediate first tick is not an export

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let batch = gate_snapshot(&filter_id, &run_id, &registry, &allowlist);
                    if !batch.is_empty() {
                        export_with_retry(exporter.as_ref(), &batch, &cancel).await;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }

        // Final flush, bounded so shutdown stays inside the grace window.
        let batch = gate_snapshot(&filter_id, &run_id, &registry, &allowlist);
        if !batch.is_empty() {
            let _ = tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, exporter.export(&batch)).await;
        }
    };
    tokio::spawn(task.instrument(Span::current()))
}
