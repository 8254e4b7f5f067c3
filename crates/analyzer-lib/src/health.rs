//! Dependency health derived from analysis cycles
//!
//! Every cycle reports, per dependency, how many metrics it attempted and
//! which of them failed. Some failures degrade a dependency; failing every
//! attempt makes it unhealthy, which `/healthz` turns into a 503.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Dependencies tracked by the analysis loop
pub mod components {
    /// Metric queries and series decoding
    pub const PROMETHEUS: &str = "prometheus";
    /// Forecast and anomaly calls
    pub const TIMEGPT: &str = "timegpt";
    /// The plaintext report file
    pub const REPORT: &str = "report";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Some metrics failed at this dependency
    Degraded,
    /// Every attempted metric failed at this dependency
    Unhealthy,
}

/// Outcome of the last cycle for one dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub attempts: usize,
    pub failures: usize,
    /// `None` until the first cycle reports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
}

impl ComponentHealth {
    /// State of a dependency no cycle has touched yet
    pub fn pending() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            attempts: 0,
            failures: 0,
            checked_at: None,
        }
    }

    /// Classify one cycle: `failures` holds a message per failed attempt
    pub fn from_outcome(attempts: usize, failures: &[String]) -> Self {
        let status = if failures.is_empty() {
            ComponentStatus::Healthy
        } else if failures.len() >= attempts {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };

        Self {
            status,
            message: (!failures.is_empty()).then(|| failures.join("; ")),
            attempts,
            failures: failures.len(),
            checked_at: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    fn from_components(components: HashMap<String, ComponentHealth>) -> Self {
        let status = components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        Self { status, components }
    }

    /// Names of unhealthy components, sorted
    pub fn unhealthy(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .components
            .iter()
            .filter(|(_, c)| c.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared between the analysis loop and the HTTP handlers
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a dependency before its first cycle
    pub async fn register(&self, name: &str) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::pending());
    }

    /// Record one cycle's outcome for `name`
    pub async fn record(
        &self,
        name: &str,
        attempts: usize,
        failures: &[String],
    ) -> ComponentStatus {
        let health = ComponentHealth::from_outcome(attempts, failures);
        let status = health.status;
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
        status
    }

    /// Mark startup as finished
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        HealthResponse::from_components(self.components.read().await.clone())
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Analyzer not yet initialized".to_string()),
            };
        }

        let health = self.health().await;
        let unhealthy = health.unhealthy();
        if unhealthy.is_empty() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some(format!("Unhealthy: {}", unhealthy.join(", "))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(metrics: &[&str]) -> Vec<String> {
        metrics
            .iter()
            .map(|m| format!("{}: no data returned", m))
            .collect()
    }

    #[test]
    fn test_outcome_classification() {
        let ok = ComponentHealth::from_outcome(4, &[]);
        assert_eq!(ok.status, ComponentStatus::Healthy);
        assert!(ok.message.is_none());
        assert!(ok.checked_at.is_some());

        let some = ComponentHealth::from_outcome(4, &failed(&["gc_pauses"]));
        assert_eq!(some.status, ComponentStatus::Degraded);
        assert_eq!(some.message.as_deref(), Some("gc_pauses: no data returned"));

        let all = ComponentHealth::from_outcome(
            4,
            &failed(&["latency", "error_rate", "heap_usage", "gc_pauses"]),
        );
        assert_eq!(all.status, ComponentStatus::Unhealthy);
        assert_eq!(all.failures, 4);
    }

    #[tokio::test]
    async fn test_registered_components_start_healthy() {
        let registry = HealthRegistry::new();
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        registry.register(components::PROMETHEUS).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components[components::PROMETHEUS].checked_at.is_none());
    }

    #[tokio::test]
    async fn test_worst_component_wins() {
        let registry = HealthRegistry::new();
        registry.record(components::TIMEGPT, 4, &[]).await;
        registry
            .record(components::PROMETHEUS, 4, &failed(&["heap_usage"]))
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        let status = registry
            .record(components::REPORT, 1, &["read-only filesystem".to_string()])
            .await;
        assert_eq!(status, ComponentStatus::Unhealthy);
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_next_good_cycle_recovers() {
        let registry = HealthRegistry::new();
        registry
            .record(components::REPORT, 1, &["disk full".to_string()])
            .await;
        registry.record(components::REPORT, 1, &[]).await;

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness_lists_unhealthy_components() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Analyzer not yet initialized"));

        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .record(components::REPORT, 1, &["permission denied".to_string()])
            .await;
        registry
            .record(
                components::PROMETHEUS,
                2,
                &failed(&["latency", "error_rate"]),
            )
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Unhealthy: prometheus, report")
        );
    }
}
