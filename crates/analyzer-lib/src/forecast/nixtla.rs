//! TimeGPT REST client

use super::{freq_string, AnalysisError, AnalysisService};
use crate::models::TimeSeries;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Public TimeGPT API endpoint
pub const DEFAULT_NIXTLA_URL: &str = "https://api.nixtla.io";

/// Model requested for forecasts and anomaly detection
pub const DEFAULT_MODEL: &str = "timegpt-1";

/// Prediction interval level used to flag anomalies
pub const DETECTION_LEVEL: u8 = 99;

#[derive(Debug, Serialize)]
struct SeriesPayload {
    sizes: Vec<usize>,
    y: Vec<f64>,
}

impl SeriesPayload {
    fn from_series(series: &TimeSeries) -> Self {
        Self {
            sizes: vec![series.len()],
            y: series.values(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ForecastRequest<'a> {
    series: SeriesPayload,
    model: &'a str,
    h: usize,
    freq: String,
    clean_ex_first: bool,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    mean: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct AnomalyRequest<'a> {
    series: SeriesPayload,
    model: &'a str,
    freq: String,
    level: Vec<u8>,
    clean_ex_first: bool,
}

#[derive(Debug, Deserialize)]
struct AnomalyResponse {
    #[serde(default)]
    anomaly: Option<Vec<bool>>,
    #[serde(default)]
    intervals: Option<HashMap<String, Vec<f64>>>,
}

/// Client for the hosted TimeGPT service
pub struct NixtlaClient {
    client: Client,
    base_url: Url,
    model: String,
}

impl NixtlaClient {
    /// Create a client authenticated with `api_key`
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AnalysisError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AnalysisError::Config("API key is empty".to_string()));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| AnalysisError::Config("API key contains invalid characters".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let mut base_url = Url::parse(base_url)
            .map_err(|e| AnalysisError::Config(format!("invalid base URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Use a different TimeGPT model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Check the API key against the service
    ///
    /// Returns `Ok(false)` when the key is rejected.
    pub async fn validate_api_key(&self) -> Result<bool, AnalysisError> {
        let url = self.endpoint("validate_token")?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => {
                info!("TimeGPT API key validated");
                Ok(true)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AnalysisError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, AnalysisError> {
        self.base_url
            .join(path)
            .map_err(|e| AnalysisError::Config(format!("invalid endpoint '{}': {}", path, e)))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AnalysisError> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "Calling TimeGPT");

        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AnalysisError::InvalidApiKey);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| AnalysisError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl AnalysisService for NixtlaClient {
    async fn forecast(
        &self,
        series: &TimeSeries,
        horizon: usize,
        sampling: Duration,
    ) -> Result<Vec<f64>, AnalysisError> {
        let request = ForecastRequest {
            series: SeriesPayload::from_series(series),
            model: &self.model,
            h: horizon,
            freq: freq_string(sampling),
            clean_ex_first: true,
        };

        let response: ForecastResponse = self.post("v2/forecast", &request).await?;
        if response.mean.len() < horizon {
            return Err(AnalysisError::MalformedResponse(format!(
                "expected {} forecast values, got {}",
                horizon,
                response.mean.len()
            )));
        }

        let mut forecast = response.mean;
        forecast.truncate(horizon);
        Ok(forecast)
    }

    async fn detect_anomalies(
        &self,
        series: &TimeSeries,
        sampling: Duration,
    ) -> Result<Vec<bool>, AnalysisError> {
        let request = AnomalyRequest {
            series: SeriesPayload::from_series(series),
            model: &self.model,
            freq: freq_string(sampling),
            level: vec![DETECTION_LEVEL],
            clean_ex_first: true,
        };

        let response: AnomalyResponse = self.post("v2/anomaly_detection", &request).await?;
        flag_anomalies(&series.values(), response)
    }
}

/// Align the service's verdicts with the input points
///
/// The service scores only the trailing points of the series (the first
/// ones serve as context), so leading points are reported as normal.
fn flag_anomalies(values: &[f64], response: AnomalyResponse) -> Result<Vec<bool>, AnalysisError> {
    let scored = match (response.anomaly, response.intervals) {
        (Some(flags), _) => flags,
        (None, Some(intervals)) => {
            let lo_key = format!("lo-{}", DETECTION_LEVEL);
            let hi_key = format!("hi-{}", DETECTION_LEVEL);
            let (lo, hi) = match (intervals.get(&lo_key), intervals.get(&hi_key)) {
                (Some(lo), Some(hi)) if lo.len() == hi.len() => (lo, hi),
                _ => {
                    return Err(AnalysisError::MalformedResponse(format!(
                        "missing or mismatched '{}'/'{}' intervals",
                        lo_key, hi_key
                    )))
                }
            };
            if lo.len() > values.len() {
                return Err(AnalysisError::MalformedResponse(format!(
                    "{} intervals for {} points",
                    lo.len(),
                    values.len()
                )));
            }
            let offset = values.len() - lo.len();
            values[offset..]
                .iter()
                .zip(lo.iter().zip(hi.iter()))
                .map(|(y, (lo, hi))| y < lo || y > hi)
                .collect()
        }
        (None, None) => {
            return Err(AnalysisError::MalformedResponse(
                "response has neither anomaly flags nor intervals".to_string(),
            ))
        }
    };

    if scored.len() > values.len() {
        return Err(AnalysisError::MalformedResponse(format!(
            "{} anomaly flags for {} points",
            scored.len(),
            values.len()
        )));
    }

    let mut flags = vec![false; values.len() - scored.len()];
    flags.extend(scored);
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeriesPoint;
    use chrono::DateTime;
    use mockito::Matcher;
    use serde_json::json;

    fn series(values: &[f64]) -> TimeSeries {
        TimeSeries {
            metric_name: "latency".to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesPoint {
                    timestamp: DateTime::from_timestamp(1_700_000_000 + 15 * i as i64, 0).unwrap(),
                    value: *v,
                })
                .collect(),
        }
    }

    fn client(url: &str) -> NixtlaClient {
        NixtlaClient::new(url, "test-key", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = NixtlaClient::new(DEFAULT_NIXTLA_URL, "  ", Duration::from_secs(5));
        assert!(matches!(result, Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_flag_anomalies_from_intervals() {
        let response = AnomalyResponse {
            anomaly: None,
            intervals: Some(HashMap::from([
                ("lo-99".to_string(), vec![0.0, 0.0, 0.0]),
                ("hi-99".to_string(), vec![1.0, 1.0, 1.0]),
            ])),
        };

        let flags = flag_anomalies(&[5.0, 0.5, 2.0, -1.0], response).unwrap();
        assert_eq!(flags, vec![false, false, true, true]);
    }

    #[test]
    fn test_flag_anomalies_prefers_explicit_flags() {
        let response = AnomalyResponse {
            anomaly: Some(vec![true, false]),
            intervals: None,
        };

        let flags = flag_anomalies(&[1.0, 2.0, 3.0], response).unwrap();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn test_flag_anomalies_rejects_oversized_response() {
        let response = AnomalyResponse {
            anomaly: Some(vec![true, true, true]),
            intervals: None,
        };
        assert!(flag_anomalies(&[1.0], response).is_err());

        let response = AnomalyResponse {
            anomaly: None,
            intervals: None,
        };
        assert!(flag_anomalies(&[1.0], response).is_err());
    }

    #[tokio::test]
    async fn test_forecast_posts_series() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/forecast")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({
                "series": { "sizes": [3], "y": [0.1, 0.12, 0.11] },
                "model": "timegpt-1",
                "h": 12,
                "freq": "15s"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "mean": vec![0.15; 12], "intervals": null }).to_string())
            .create_async()
            .await;

        let forecast = client(&server.url())
            .forecast(&series(&[0.1, 0.12, 0.11]), 12, Duration::from_secs(15))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(forecast.len(), 12);
        assert!(forecast.iter().all(|v| (*v - 0.15).abs() < 1e-12));
    }

    #[tokio::test]
    async fn test_forecast_short_response_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/forecast")
            .with_status(200)
            .with_body(json!({ "mean": [0.1, 0.2] }).to_string())
            .create_async()
            .await;

        let result = client(&server.url())
            .forecast(&series(&[0.1]), 12, Duration::from_secs(15))
            .await;
        assert!(matches!(result, Err(AnalysisError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_forecast_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/forecast")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let result = client(&server.url())
            .forecast(&series(&[0.1]), 12, Duration::from_secs(15))
            .await;
        assert!(matches!(
            result,
            Err(AnalysisError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_detect_anomalies_uses_intervals() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/anomaly_detection")
            .match_body(Matcher::PartialJson(json!({ "level": [99], "freq": "15s" })))
            .with_status(200)
            .with_body(
                json!({
                    "mean": [0.11, 0.11],
                    "intervals": { "lo-99": [0.05, 0.05], "hi-99": [0.2, 0.2] }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let flags = client(&server.url())
            .detect_anomalies(&series(&[0.1, 0.12, 0.9]), Duration::from_secs(15))
            .await
            .unwrap();

        assert_eq!(flags, vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_unauthorized_call_is_invalid_key() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/anomaly_detection")
            .with_status(401)
            .create_async()
            .await;

        let result = client(&server.url())
            .detect_anomalies(&series(&[0.1]), Duration::from_secs(15))
            .await;
        assert!(matches!(result, Err(AnalysisError::InvalidApiKey)));
    }

    #[tokio::test]
    async fn test_validate_api_key() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("POST", "/validate_token")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(r#"{"detail":"success"}"#)
            .create_async()
            .await;
        assert!(client(&server.url()).validate_api_key().await.unwrap());

        let _denied = server
            .mock("POST", "/validate_token")
            .match_header("authorization", "Bearer other-key")
            .with_status(401)
            .create_async()
            .await;
        let other = NixtlaClient::new(&server.url(), "other-key", Duration::from_secs(5)).unwrap();
        assert!(!other.validate_api_key().await.unwrap());
    }
}
