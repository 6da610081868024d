//! Health tracking for the monitoring pipeline
//!
//! A fatally stopped collector or a failing sink must be observable through
//! a status accessor, not only in logs. Pipeline stages report into the
//! registry; the HTTP layer exposes it as liveness/readiness.

use crate::collector::CollectorStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still operational, but losing data (e.g. sink writes failing)
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered this status
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components; healthy when there are none
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .max_by_key(|s| match s {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const COLLECTOR: &str = "collector";
    pub const PROCESSOR: &str = "processor";
    pub const SINK: &str = "sink";
}

/// Registry of component health, shared by cloning
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the collector, processor and sink as healthy
    pub async fn register_pipeline(&self) {
        let mut map = self.components.write().await;
        for name in [components::COLLECTOR, components::PROCESSOR, components::SINK] {
            map.entry(name.to_string())
                .or_insert_with(ComponentHealth::healthy);
        }
    }

    /// Set a component's health; the `since` time is kept when the status is unchanged
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut map = self.components.write().await;
        match map.get_mut(name) {
            Some(existing) if existing.status == health.status => {
                existing.message = health.message;
            }
            _ => {
                map.insert(name.to_string(), health);
            }
        }
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Mirror the collector service status into the collector component
    pub async fn record_collector_status(&self, status: &CollectorStatus) {
        let health = match status {
            CollectorStatus::Running => ComponentHealth::healthy(),
            CollectorStatus::Stopped => ComponentHealth::degraded("collector stopped"),
            CollectorStatus::Failed { error } => ComponentHealth::unhealthy(error.to_string()),
        };
        self.update(components::COLLECTOR, health).await;
    }

    pub async fn component(&self, name: &str) -> Option<ComponentHealth> {
        self.components.read().await.get(name).cloned()
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready while the collector is running and nothing is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let health = self.health().await;

        let reason = match health.components.get(components::COLLECTOR) {
            None => Some("Monitor not yet started".to_string()),
            Some(c) if c.status != ComponentStatus::Healthy => Some(
                c.message
                    .clone()
                    .unwrap_or_else(|| "Collector not running".to_string()),
            ),
            Some(_) if health.status == ComponentStatus::Unhealthy => {
                Some("Pipeline component unhealthy".to_string())
            }
            Some(_) => None,
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
