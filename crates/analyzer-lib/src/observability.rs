//! Observability infrastructure for the analyzer
//!
//! Provides:
//! - Prometheus metrics (analysis cycles, latency forecast, anomaly count)
//! - Structured JSON logging with tracing

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Published metrics held in their own registry
struct AnalyzerMetricsInner {
    registry: Registry,
    analysis_requests: IntCounter,
    latency_forecast: Gauge,
    anomaly_count: IntCounter,
}

impl AnalyzerMetricsInner {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let analysis_requests = IntCounter::new(
            "timegpt_analysis_requests_total",
            "Total TimeGPT analysis requests",
        )?;
        let latency_forecast =
            Gauge::new("timegpt_latency_forecast", "Forecasted latency by TimeGPT")?;
        let anomaly_count = IntCounter::new(
            "timegpt_anomaly_count_total",
            "Number of anomalies detected by TimeGPT",
        )?;

        registry.register(Box::new(analysis_requests.clone()))?;
        registry.register(Box::new(latency_forecast.clone()))?;
        registry.register(Box::new(anomaly_count.clone()))?;

        Ok(Self {
            registry,
            analysis_requests,
            latency_forecast,
            anomaly_count,
        })
    }
}

/// Analyzer metrics for Prometheus exposition
///
/// Clones share the same registry. Each `new()` creates an independent
/// registry, so tests can build as many as they like.
#[derive(Clone)]
pub struct AnalyzerMetrics {
    inner: Arc<AnalyzerMetricsInner>,
}

impl AnalyzerMetrics {
    /// Create and register the analyzer metrics
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            inner: Arc::new(AnalyzerMetricsInner::new()?),
        })
    }

    /// Record the start of an analysis cycle
    pub fn inc_analysis_requests(&self) {
        self.inner.analysis_requests.inc();
    }

    /// Overwrite the latency forecast gauge
    pub fn set_latency_forecast(&self, value: f64) {
        self.inner.latency_forecast.set(value);
    }

    /// Add newly detected anomalies to the running total
    pub fn add_anomalies(&self, count: u64) {
        self.inner.anomaly_count.inc_by(count);
    }

    pub fn analysis_requests(&self) -> u64 {
        self.inner.analysis_requests.get()
    }

    pub fn latency_forecast(&self) -> f64 {
        self.inner.latency_forecast.get()
    }

    pub fn anomaly_count(&self) -> u64 {
        self.inner.anomaly_count.get()
    }

    /// Registry backing these metrics
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Encode all metrics in the Prometheus text exposition format
    pub fn encode_text(&self) -> prometheus::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for analyzer events
///
/// Provides consistent JSON-formatted logging for cycles, skipped
/// metrics, analysis results and report output.
#[derive(Clone)]
pub struct AnalyzerLogger {
    service: String,
}

impl AnalyzerLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log analyzer startup
    pub fn log_startup(&self, version: &str, metrics_port: u16) {
        info!(
            event = "analyzer_started",
            service = %self.service,
            version = %version,
            metrics_port = metrics_port,
            "TimeGPT analysis server running"
        );
    }

    /// Log whether Prometheus answered the startup `up` query
    pub fn log_connectivity_check(&self, reachable: bool) {
        if reachable {
            info!(
                event = "prometheus_connectivity",
                service = %self.service,
                reachable = true,
                "Prometheus connectivity check succeeded"
            );
        } else {
            warn!(
                event = "prometheus_connectivity",
                service = %self.service,
                reachable = false,
                "Prometheus connectivity check returned no data"
            );
        }
    }

    /// Log the start of an analysis cycle
    pub fn log_cycle_started(&self, cycle: u64, metrics: usize) {
        info!(
            event = "cycle_started",
            service = %self.service,
            cycle = cycle,
            metrics = metrics,
            "Starting analysis cycle"
        );
    }

    /// Log a metric skipped for this cycle
    pub fn log_metric_skipped(&self, metric: &str, stage: &str, reason: &str) {
        warn!(
            event = "metric_skipped",
            service = %self.service,
            metric = %metric,
            stage = %stage,
            reason = %reason,
            "Metric skipped for this cycle"
        );
    }

    /// Log a successful analysis
    pub fn log_analysis(&self, metric: &str, points: usize, forecast_mean: f64, anomalies: u64) {
        info!(
            event = "metric_analyzed",
            service = %self.service,
            metric = %metric,
            points = points,
            forecast_mean = forecast_mean,
            anomalies = anomalies,
            "TimeGPT analysis complete"
        );
    }

    /// Log the report write outcome
    pub fn log_report(&self, path: &str, result: Result<(), &str>) {
        match result {
            Ok(()) => info!(
                event = "report_written",
                service = %self.service,
                path = %path,
                "Wrote analysis report"
            ),
            Err(e) => warn!(
                event = "report_failed",
                service = %self.service,
                path = %path,
                error = %e,
                "Failed to write analysis report"
            ),
        }
    }

    /// Log completion of a cycle
    pub fn log_cycle_complete(&self, cycle: u64, analyzed: usize, skipped: usize) {
        info!(
            event = "cycle_complete",
            service = %self.service,
            cycle = cycle,
            analyzed = analyzed,
            skipped = skipped,
            "Analysis cycle complete"
        );
    }

    /// Log the rendered summary of a cycle
    pub fn log_summary(&self, cycle: u64, summary: &str) {
        info!(
            event = "summary_published",
            service = %self.service,
            cycle = cycle,
            summary = %summary,
            "Analysis summary"
        );
    }

    /// Log a cycle aborted by an unexpected error
    pub fn log_cycle_error(&self, cycle: u64, error: &str) {
        error!(
            event = "cycle_failed",
            service = %self.service,
            cycle = cycle,
            error = %error,
            "Error during analysis"
        );
    }

    /// Log analyzer shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "analyzer_shutdown",
            service = %self.service,
            reason = %reason,
            "TimeGPT analyzer shutting down"
        );
    }
}

/// Collects formatted log lines so tests can assert on emitted events
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct LogCapture(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl LogCapture {
    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let writer = self.clone();
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish()
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
