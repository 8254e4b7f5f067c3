//! Analyzer configuration

use analyzer_lib::{
    backend::DEFAULT_PROMETHEUS_URL, forecast::DEFAULT_NIXTLA_URL, report::DEFAULT_REPORT_PATH,
    AnalysisConfig,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Analyzer configuration
///
/// Tunables come from `ANALYZER_*` variables; the TimeGPT credentials come
/// from `NIXTLA_API_KEY` and `NIXTLA_BASE_URL`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Prometheus server queried each cycle
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Port for the metrics and health endpoints
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Report file rewritten every cycle
    #[serde(default = "default_report_path")]
    pub report_path: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_lookback")]
    pub lookback_secs: u64,

    #[serde(default = "default_step")]
    pub step_secs: u64,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_forecast_horizon")]
    pub forecast_horizon: usize,

    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_secs: u64,

    /// TimeGPT API key (`NIXTLA_API_KEY`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// TimeGPT API endpoint (`NIXTLA_BASE_URL`)
    #[serde(default = "default_nixtla_url")]
    pub base_url: String,
}

fn default_prometheus_url() -> String {
    DEFAULT_PROMETHEUS_URL.to_string()
}

fn default_metrics_port() -> u16 {
    8001
}

fn default_report_path() -> String {
    DEFAULT_REPORT_PATH.to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_lookback() -> u64 {
    3600
}

fn default_step() -> u64 {
    15
}

fn default_query_timeout() -> u64 {
    10
}

fn default_forecast_horizon() -> usize {
    12
}

fn default_analysis_timeout() -> u64 {
    60
}

fn default_nixtla_url() -> String {
    DEFAULT_NIXTLA_URL.to_string()
}

impl AnalyzerConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from `vars` instead of the process environment
    pub fn load_from(vars: Option<config::Map<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("ANALYZER")
                    .try_parsing(true)
                    .source(vars.clone()),
            )
            .add_source(config::Environment::with_prefix("NIXTLA").source(vars))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid analyzer configuration")
    }

    /// The TimeGPT API key; startup cannot continue without one
    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .context("NIXTLA_API_KEY environment variable not set")
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    /// Loop settings derived from this configuration
    pub fn analysis(&self) -> AnalysisConfig {
        AnalysisConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            lookback: Duration::from_secs(self.lookback_secs),
            step: Duration::from_secs(self.step_secs),
            horizon: self.forecast_horizon,
            sampling: Duration::from_secs(self.step_secs),
        }
    }
}
