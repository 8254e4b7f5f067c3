//! Periodic analysis of backend metrics
//!
//! Each cycle queries every configured metric, forecasts it and scores it
//! for anomalies, then publishes the results and rewrites the report.

mod r#loop;


pub use r#loop::{AnalysisConfig, AnalysisLoop, AnalysisLoopBuilder, DEFAULT_POLL_INTERVAL, LOOKBACK};

use crate::models::AnalysisResult;
use std::fmt;

/// Stage of the per-metric pipeline that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipStage {
    Query,
    Series,
    Forecast,
    Anomalies,
}

impl SkipStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipStage::Query => "query",
            SkipStage::Series => "series",
            SkipStage::Forecast => "forecast",
            SkipStage::Anomalies => "anomalies",
        }
    }
}

impl fmt::Display for SkipStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of analyzing one metric in one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    Analyzed(AnalysisResult),
    Skipped { stage: SkipStage, reason: String },
}

impl MetricOutcome {
    pub fn skipped(stage: SkipStage, reason: impl Into<String>) -> Self {
        MetricOutcome::Skipped {
            stage,
            reason: reason.into(),
        }
    }

    pub fn is_analyzed(&self) -> bool {
        matches!(self, MetricOutcome::Analyzed(_))
    }
}
