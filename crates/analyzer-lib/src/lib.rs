//! Analyzer library for TimeGPT metric analysis
//!
//! This crate provides the core functionality for:
//! - Range queries against Prometheus
//! - Series preparation from query responses
//! - Forecasting and anomaly detection through TimeGPT
//! - The periodic analysis loop and its plaintext report
//! - Health checks and observability

pub mod analysis;
pub mod backend;
pub mod forecast;
pub mod health;
pub mod models;
pub mod observability;
pub mod report;

pub use analysis::{AnalysisConfig, AnalysisLoop, AnalysisLoopBuilder, MetricOutcome, SkipStage};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AnalyzerLogger, AnalyzerMetrics};
