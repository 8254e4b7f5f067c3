//! Remote forecasting and anomaly detection
//!
//! Forecasts and anomaly flags come from the hosted TimeGPT service;
//! nothing is modelled locally.

mod nixtla;

pub use nixtla::{NixtlaClient, DEFAULT_MODEL, DEFAULT_NIXTLA_URL, DETECTION_LEVEL};

use crate::models::TimeSeries;
use std::time::Duration;
use thiserror::Error;

pub use async_trait::async_trait;

/// Number of future steps requested per forecast
pub const FORECAST_HORIZON: usize = 12;

/// Nominal spacing between series points
pub const SAMPLING_INTERVAL: Duration = Duration::from_secs(15);

/// Errors returned by an analysis service
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("API key rejected")]
    InvalidApiKey,
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Trait for forecast/anomaly services
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Forecast `horizon` steps past the end of `series`
    async fn forecast(
        &self,
        series: &TimeSeries,
        horizon: usize,
        sampling: Duration,
    ) -> Result<Vec<f64>, AnalysisError>;

    /// Flag each point of `series` as anomalous or not
    async fn detect_anomalies(
        &self,
        series: &TimeSeries,
        sampling: Duration,
    ) -> Result<Vec<bool>, AnalysisError>;
}

/// Render a sampling interval as a pandas-style frequency string
pub fn freq_string(sampling: Duration) -> String {
    let secs = sampling.as_secs().max(1);
    if secs % 86_400 == 0 {
        format!("{}D", secs / 86_400)
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}min", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freq_string() {
        assert_eq!(freq_string(Duration::from_secs(15)), "15s");
        assert_eq!(freq_string(Duration::from_secs(300)), "5min");
        assert_eq!(freq_string(Duration::from_secs(7200)), "2h");
        assert_eq!(freq_string(Duration::from_secs(86_400)), "1D");
        assert_eq!(freq_string(Duration::from_millis(10)), "1s");
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0, 2.0]), Some(2.0));
    }
}
