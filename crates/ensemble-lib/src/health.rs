//! Health tracking for the prediction service
//!
//! Component statuses feed the readiness probe; `ServiceHealth` is the
//! bundle-centric summary returned by the health endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, but the last operation failed
    Degraded,
    Unhealthy,
}

/// One component's last reported state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: Utc::now(),
        }
    }
}

/// Body of the component health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status across components; healthy when none are registered
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of the readiness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Service-level status reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Ok,
    NotReady,
}

/// Loaded-bundle summary: whether predictions can be served, and against
/// which schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: ServiceStatus,
    pub models_loaded: usize,
    pub n_features: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ServiceHealth {
    pub fn not_ready() -> Self {
        Self {
            status: ServiceStatus::NotReady,
            models_loaded: 0,
            n_features: 0,
            version: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ServiceStatus::Ok
    }
}

/// Component names for health tracking
pub mod components {
    pub const BUNDLE: &str = "bundle";
    pub const WATCHER: &str = "watcher";
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<String, ComponentHealth>,
    bundle_loaded: bool,
}

/// Shared component health; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a component as healthy
    pub async fn register(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    async fn set(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), ComponentHealth::new(status, message));
    }

    pub async fn set_healthy(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Degraded, Some(message.into())).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Unhealthy, Some(message.into())).await;
    }

    /// Record whether a bundle is available for serving
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.bundle_loaded = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    /// Ready once a bundle is loaded and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let failing = state
            .components
            .iter()
            .find(|(_, c)| c.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.clone());

        let reason = match (state.bundle_loaded, failing) {
            (false, _) => Some("No model bundle loaded".to_string()),
            (true, Some(name)) => Some(format!("Component {} unhealthy", name)),
            (true, None) => None,
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
