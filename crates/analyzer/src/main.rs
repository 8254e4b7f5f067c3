//! TimeGPT Analyzer - forecasting and anomaly detection for Spring Boot metrics
//!
//! Polls Prometheus every cycle, sends each series to TimeGPT, republishes
//! the results as Prometheus metrics and rewrites a plaintext report.

use analyzer_lib::{
    backend::{MetricsBackend, PrometheusClient, QueryWindow, DEFAULT_STEP},
    forecast::NixtlaClient,
    health::{components, HealthRegistry},
    report::ReportWriter,
    AnalysisLoopBuilder, AnalyzerLogger, AnalyzerMetrics,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use timegpt_analyzer::{api, config::AnalyzerConfig, supervisor};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ANALYZER_VERSION: &str = env!("CARGO_PKG_VERSION");
const SERVICE_NAME: &str = "timegpt-analyzer";

/// Window of the startup `up` query
const CONNECTIVITY_WINDOW: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting timegpt-analyzer");

    if let Err(e) = run().await {
        error!(error = %format!("{:#}", e), "Analyzer terminated with error");
        return Err(e);
    }

    Ok(())
}

async fn run() -> Result<()> {
    let config = AnalyzerConfig::load()?;
    info!(
        prometheus_url = %config.prometheus_url,
        metrics_port = config.metrics_port,
        report_path = %config.report_path,
        "Analyzer configured"
    );

    // Credentials are checked before anything else starts
    let nixtla = NixtlaClient::new(
        &config.base_url,
        config.api_key()?,
        config.analysis_timeout(),
    )
    .context("Failed to create TimeGPT client")?;
    let valid = nixtla
        .validate_api_key()
        .await
        .context("Failed to validate TimeGPT API key")?;
    if !valid {
        anyhow::bail!("Invalid Nixtla API key");
    }
    info!("Nixtla client initialized successfully");

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::PROMETHEUS).await;
    health_registry.register(components::TIMEGPT).await;
    health_registry.register(components::REPORT).await;

    // Initialize metrics
    let metrics = AnalyzerMetrics::new().context("Failed to register metrics")?;

    let logger = AnalyzerLogger::new(SERVICE_NAME);

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
    ));
    let listener = api::bind(config.metrics_port)
        .await
        .with_context(|| format!("Failed to bind metrics port {}", config.metrics_port))?;
    let api_handle = tokio::spawn(api::serve(listener, app_state));
    logger.log_startup(ANALYZER_VERSION, config.metrics_port);

    let backend = Arc::new(
        PrometheusClient::new(&config.prometheus_url, config.query_timeout())
            .context("Failed to create Prometheus client")?,
    );

    // Connectivity check; an empty answer is only logged
    let up_window = QueryWindow::last(CONNECTIVITY_WINDOW, DEFAULT_STEP)?;
    let up = backend.query_range("up", &up_window).await;
    logger.log_connectivity_check(!up.is_empty());

    let analysis_loop = AnalysisLoopBuilder::new()
        .backend(backend)
        .service(Arc::new(nixtla))
        .metrics(metrics)
        .report(ReportWriter::new(&config.report_path))
        .health(health_registry.clone())
        .logger(logger.clone())
        .config(config.analysis())
        .build()?;

    health_registry.set_ready(true).await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut loop_handle = tokio::spawn(analysis_loop.run(shutdown_rx));

    supervisor::wait_for_shutdown(tokio::signal::ctrl_c(), api_handle, &mut loop_handle).await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    loop_handle.await?;
    info!("Shutting down");

    Ok(())
}
