//! Prometheus backend access
//!
//! This module provides:
//! - A ranged-query client for the Prometheus HTTP API
//! - Conversion of `query_range` responses into forecastable series

mod client;
mod series;

pub use client::{PrometheusClient, DEFAULT_PROMETHEUS_URL, QUERY_TIMEOUT};
pub use series::{build_series, SeriesError};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::time::Duration;

pub use async_trait::async_trait;

/// Default resolution step for range queries
pub const DEFAULT_STEP: Duration = Duration::from_secs(15);

/// Time range and resolution of a range query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl QueryWindow {
    /// Window of `lookback` ending at `end`
    pub fn ending_at(end: DateTime<Utc>, lookback: Duration, step: Duration) -> Result<Self> {
        let start = ChronoDuration::from_std(lookback)
            .ok()
            .and_then(|lookback| end.checked_sub_signed(lookback))
            .with_context(|| format!("lookback of {:?} is out of range", lookback))?;

        Ok(Self { start, end, step })
    }

    /// Window of `lookback` ending now
    pub fn last(lookback: Duration, step: Duration) -> Result<Self> {
        Self::ending_at(Utc::now(), lookback, step)
    }

    /// Step rendered as a Prometheus duration string
    pub fn step_param(&self) -> String {
        format!("{}s", self.step.as_secs().max(1))
    }
}

/// Parsed `query_range` response body, or nothing when the query failed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQueryResult {
    body: Option<Value>,
}

impl RawQueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_body(body: Value) -> Self {
        Self { body: Some(body) }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_none()
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

/// Trait for time-series backends queried each cycle
///
/// Implementations never fail: errors are logged and reported as an
/// empty result.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Run a range query for `expression` over `window`
    async fn query_range(&self, expression: &str, window: &QueryWindow) -> RawQueryResult;
}
