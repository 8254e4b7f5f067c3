//! Core data models for the analyzer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Header line of the rendered analysis report
pub const SUMMARY_HEADER: &str = "TimeGPT Analysis of Spring Boot Metrics:";

/// Name of the metric whose forecast drives the latency gauge
pub const LATENCY_METRIC: &str = "latency";

/// A named PromQL expression polled every cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub name: String,
    pub expression: String,
}

impl MetricQuery {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// The fixed set of Spring Boot metrics analyzed each cycle, in report order
pub fn default_queries() -> Vec<MetricQuery> {
    vec![
        MetricQuery::new(
            LATENCY_METRIC,
            r#"avg(rate(http_server_requests_seconds_sum{application="user-system"}[5m]) / rate(http_server_requests_seconds_count{application="user-system"}[5m]))"#,
        ),
        MetricQuery::new(
            "error_rate",
            r#"rate(http_server_requests_seconds_count{application="user-system",outcome="SERVER_ERROR"}[5m])"#,
        ),
        MetricQuery::new(
            "heap_usage",
            r#"jvm_memory_used_bytes{application="user-system",area="heap"}"#,
        ),
        MetricQuery::new(
            "gc_pauses",
            r#"rate(jvm_gc_pause_seconds_sum{application="user-system"}[5m])"#,
        ),
    ]
}

/// A single observation in a time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Ordered observations of one metric over the lookback window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub metric_name: String,
    pub points: Vec<SeriesPoint>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Observed values in timestamp order
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

/// Outcome of forecasting and anomaly detection for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub metric_name: String,
    pub forecast_mean: f64,
    pub anomaly_count: u64,
}

/// Ordered analysis results for one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub results: Vec<AnalysisResult>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: AnalysisResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, metric_name: &str) -> Option<&AnalysisResult> {
        self.results.iter().find(|r| r.metric_name == metric_name)
    }

    /// Render the plaintext report written to disk each cycle
    pub fn render(&self) -> String {
        let mut out = String::from(SUMMARY_HEADER);
        out.push('\n');
        for result in &self.results {
            // Writing to a String cannot fail
            let _ = writeln!(out, "- {}:", capitalize(&result.metric_name));
            let _ = writeln!(out, "  Forecasted Value: {:.4}", result.forecast_mean);
            let _ = writeln!(out, "  Anomalies Detected: {}", result.anomaly_count);
        }
        out
    }
}

/// Upper-case the first character and lower-case the rest
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
