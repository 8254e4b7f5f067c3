//! Analysis loop
//!
//! Runs one analysis cycle, sleeps for the poll interval, and repeats
//! until shut down. Failures are contained per metric; only the process
//! startup can be fatal.

use super::{MetricOutcome, SkipStage};
use crate::backend::{build_series, MetricsBackend, QueryWindow, DEFAULT_STEP};
use crate::forecast::{mean, AnalysisService, FORECAST_HORIZON, SAMPLING_INTERVAL};
use crate::health::{components, HealthRegistry};
use crate::models::{default_queries, AnalysisResult, MetricQuery, Summary, LATENCY_METRIC};
use crate::observability::{AnalyzerLogger, AnalyzerMetrics};
use crate::report::ReportWriter;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info};

/// Time between the end of one cycle and the start of the next
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Width of the query window; intentionally independent of the poll interval
pub const LOOKBACK: Duration = Duration::from_secs(3600);

/// Configuration for the analysis loop
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Sleep between cycles (default: 30 seconds)
    pub poll_interval: Duration,
    /// Query window width (default: 1 hour)
    pub lookback: Duration,
    /// Query resolution step (default: 15 seconds)
    pub step: Duration,
    /// Forecast horizon in steps (default: 12)
    pub horizon: usize,
    /// Sampling interval passed to the analysis service (default: 15 seconds)
    pub sampling: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            lookback: LOOKBACK,
            step: DEFAULT_STEP,
            horizon: FORECAST_HORIZON,
            sampling: SAMPLING_INTERVAL,
        }
    }
}

/// Failures seen during a cycle, grouped by dependency
#[derive(Debug, Default)]
struct CycleFailures {
    prometheus: Vec<String>,
    timegpt: Vec<String>,
}

/// Polls the backend and publishes TimeGPT analyses
pub struct AnalysisLoop {
    backend: Arc<dyn MetricsBackend>,
    service: Arc<dyn AnalysisService>,
    metrics: AnalyzerMetrics,
    report: ReportWriter,
    health: Option<HealthRegistry>,
    logger: AnalyzerLogger,
    queries: Vec<MetricQuery>,
    config: AnalysisConfig,
    cycle: u64,
}

impl AnalysisLoop {
    /// Create a loop over the default Spring Boot queries
    pub fn new(
        backend: Arc<dyn MetricsBackend>,
        service: Arc<dyn AnalysisService>,
        metrics: AnalyzerMetrics,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            backend,
            service,
            metrics,
            report: ReportWriter::default(),
            health: None,
            logger: AnalyzerLogger::new("timegpt-analyzer"),
            queries: default_queries(),
            config,
            cycle: 0,
        }
    }

    /// Number of cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Run cycles until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            lookback_secs = self.config.lookback.as_secs(),
            metrics = self.queries.len(),
            "Starting analysis loop"
        );

        loop {
            match self.run_cycle().await {
                Ok(summary) => {
                    let rendered = summary.render();
                    println!("{}", rendered);
                    self.logger.log_summary(self.cycle, &rendered);
                }
                Err(e) => self
                    .logger
                    .log_cycle_error(self.cycle, &format!("{:#}", e)),
            }

            tokio::select! {
                _ = sleep(self.config.poll_interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down analysis loop");
                    break;
                }
            }
        }
    }

    /// Run a single analysis cycle over all queries
    pub async fn run_cycle(&mut self) -> Result<Summary> {
        self.cycle += 1;
        self.metrics.inc_analysis_requests();
        self.logger.log_cycle_started(self.cycle, self.queries.len());

        let window = QueryWindow::last(self.config.lookback, self.config.step)?;
        debug!(start = %window.start, end = %window.end, "Computed query window");

        let mut summary = Summary::new();
        let mut failures = CycleFailures::default();

        for query in &self.queries {
            match self.analyze_metric(query, &window).await {
                MetricOutcome::Analyzed(result) => {
                    if result.metric_name == LATENCY_METRIC {
                        self.metrics.set_latency_forecast(result.forecast_mean);
                    }
                    self.metrics.add_anomalies(result.anomaly_count);
                    summary.push(result);
                }
                MetricOutcome::Skipped { stage, reason } => {
                    self.logger
                        .log_metric_skipped(&query.name, stage.as_str(), &reason);
                    let message = format!("{}: {}", query.name, reason);
                    match stage {
                        SkipStage::Query | SkipStage::Series => failures.prometheus.push(message),
                        SkipStage::Forecast | SkipStage::Anomalies => {
                            failures.timegpt.push(message)
                        }
                    }
                }
            }
        }

        let report_path = self.report.path().display().to_string();
        let report_result = self.report.write(&summary).await.map_err(|e| e.to_string());
        self.logger
            .log_report(&report_path, report_result.as_ref().map(|_| ()).map_err(String::as_str));

        self.update_health(&failures, report_result.err()).await;

        let skipped = self.queries.len() - summary.len();
        self.logger
            .log_cycle_complete(self.cycle, summary.len(), skipped);

        Ok(summary)
    }

    /// Query, build, forecast and score one metric
    async fn analyze_metric(&self, query: &MetricQuery, window: &QueryWindow) -> MetricOutcome {
        let raw = self.backend.query_range(&query.expression, window).await;
        if raw.is_empty() {
            return MetricOutcome::skipped(SkipStage::Query, "no data returned");
        }

        let series = match build_series(&raw, &query.name) {
            Ok(series) => series,
            Err(e) => return MetricOutcome::skipped(SkipStage::Series, e.to_string()),
        };

        debug!(metric = %query.name, points = series.len(), "Running TimeGPT forecast");
        let forecast = match self
            .service
            .forecast(&series, self.config.horizon, self.config.sampling)
            .await
        {
            Ok(forecast) => forecast,
            Err(e) => return MetricOutcome::skipped(SkipStage::Forecast, e.to_string()),
        };
        let forecast_mean = match mean(&forecast) {
            Some(m) => m,
            None => return MetricOutcome::skipped(SkipStage::Forecast, "empty forecast"),
        };

        debug!(metric = %query.name, "Running TimeGPT anomaly detection");
        let flags = match self
            .service
            .detect_anomalies(&series, self.config.sampling)
            .await
        {
            Ok(flags) => flags,
            Err(e) => return MetricOutcome::skipped(SkipStage::Anomalies, e.to_string()),
        };
        let anomaly_count = flags.iter().filter(|flagged| **flagged).count() as u64;

        self.logger
            .log_analysis(&query.name, series.len(), forecast_mean, anomaly_count);

        MetricOutcome::Analyzed(AnalysisResult {
            metric_name: query.name.clone(),
            forecast_mean,
            anomaly_count,
        })
    }

    async fn update_health(&self, failures: &CycleFailures, report_error: Option<String>) {
        let Some(health) = &self.health else {
            return;
        };

        let attempted = self.queries.len();
        health
            .record(components::PROMETHEUS, attempted, &failures.prometheus)
            .await;

        // Only metrics that produced a series reach TimeGPT
        let reached = attempted - failures.prometheus.len();
        if reached > 0 {
            health
                .record(components::TIMEGPT, reached, &failures.timegpt)
                .await;
        }

        let report_failures: Vec<String> = report_error.into_iter().collect();
        health
            .record(components::REPORT, 1, &report_failures)
            .await;
    }
}

/// Builder for creating the analysis loop
pub struct AnalysisLoopBuilder {
    backend: Option<Arc<dyn MetricsBackend>>,
    service: Option<Arc<dyn AnalysisService>>,
    metrics: Option<AnalyzerMetrics>,
    report: ReportWriter,
    health: Option<HealthRegistry>,
    logger: Option<AnalyzerLogger>,
    queries: Vec<MetricQuery>,
    config: AnalysisConfig,
}

impl AnalysisLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            backend: None,
            service: None,
            metrics: None,
            report: ReportWriter::default(),
            health: None,
            logger: None,
            queries: default_queries(),
            config: AnalysisConfig::default(),
        }
    }

    pub fn backend(mut self, backend: Arc<dyn MetricsBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn service(mut self, service: Arc<dyn AnalysisService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn metrics(mut self, metrics: AnalyzerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set where the report is written
    pub fn report(mut self, report: ReportWriter) -> Self {
        self.report = report;
        self
    }

    /// Track dependency health in `health`
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: AnalyzerLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Replace the default query set
    pub fn queries(mut self, queries: Vec<MetricQuery>) -> Self {
        self.queries = queries;
        self
    }

    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the analysis loop
    pub fn build(self) -> Result<AnalysisLoop> {
        let backend = self
            .backend
            .ok_or_else(|| anyhow::anyhow!("Backend is required"))?;
        let service = self
            .service
            .ok_or_else(|| anyhow::anyhow!("Analysis service is required"))?;
        let metrics = self
            .metrics
            .ok_or_else(|| anyhow::anyhow!("Metrics are required"))?;

        let mut analysis_loop = AnalysisLoop::new(backend, service, metrics, self.config);
        analysis_loop.report = self.report;
        analysis_loop.health = self.health;
        analysis_loop.queries = self.queries;
        if let Some(logger) = self.logger {
            analysis_loop.logger = logger;
        }

        Ok(analysis_loop)
    }
}

impl Default for AnalysisLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
