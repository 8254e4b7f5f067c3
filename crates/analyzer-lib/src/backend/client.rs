//! HTTP client for the Prometheus range query API

use super::{MetricsBackend, QueryWindow, RawQueryResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default Prometheus server address
pub const DEFAULT_PROMETHEUS_URL: &str = "http://prometheus:9090";

/// Timeout applied to each range query
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

const QUERY_RANGE_PATH: &str = "api/v1/query_range";

/// Prometheus range query client
pub struct PrometheusClient {
    client: Client,
    query_url: Url,
}

impl PrometheusClient {
    /// Create a client for the server at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid Prometheus URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let query_url = base_url
            .join(QUERY_RANGE_PATH)
            .context("Invalid Prometheus URL")?;

        Ok(Self { client, query_url })
    }

    /// Full URL of the range query endpoint
    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    async fn fetch(&self, expression: &str, window: &QueryWindow) -> Result<Value> {
        let start = window.start.to_rfc3339_opts(SecondsFormat::Micros, false);
        let end = window.end.to_rfc3339_opts(SecondsFormat::Micros, false);
        let step = window.step_param();

        info!(
            url = %self.query_url,
            query = %expression,
            start = %start,
            end = %end,
            step = %step,
            "Querying Prometheus"
        );

        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[
                ("query", expression),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("step", step.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Prometheus error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn query_range(&self, expression: &str, window: &QueryWindow) -> RawQueryResult {
        let body = match self.fetch(expression, window).await {
            Ok(body) => body,
            Err(e) => {
                warn!(query = %expression, error = %format!("{:#}", e), "Prometheus query failed");
                return RawQueryResult::empty();
            }
        };

        debug!(query = %expression, response = %body, "Prometheus response");

        if body.get("data").is_none() {
            warn!(
                query = %expression,
                response = %body,
                "'data' key missing in Prometheus response"
            );
            return RawQueryResult::empty();
        }

        RawQueryResult::from_body(body)
    }
}
