//! Component health for liveness and readiness probes
//!
//! Every tick reports either success or the error that ended it. The error
//! is charged to the component that raised it: a single failure degrades
//! the component, [`UNHEALTHY_AFTER_FAILURES`] consecutive failures mark it
//! unhealthy, and the next successful tick clears every component.

use crate::error::ScalerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failed ticks after which a component is unhealthy
pub const UNHEALTHY_AFTER_FAILURES: u32 = 5;

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Recent ticks failed here; the loop is still retrying
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    /// Failed ticks charged to this component since the last success
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            consecutive_failures: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    fn record_failure(&mut self, error: String) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.status = if self.consecutive_failures >= UNHEALTHY_AFTER_FAILURES {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        self.last_error = Some(error);
        self.updated_at = Utc::now();
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status across all components
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const RECONCILER: &str = "reconciler";
    pub const CLUSTER_API: &str = "cluster_api";
    pub const POOL_API: &str = "pool_api";

    pub const ALL: &[&str] = &[RECONCILER, CLUSTER_API, POOL_API];
}

/// Component a failed tick is charged to
pub fn component_for(error: &ScalerError) -> &'static str {
    match error {
        ScalerError::Cluster(_) => components::CLUSTER_API,
        ScalerError::PoolStatus { .. }
        | ScalerError::PoolTransport(_)
        | ScalerError::Decode { .. }
        | ScalerError::Credential(_)
        | ScalerError::Command { .. } => components::POOL_API,
        ScalerError::Config(_) | ScalerError::Cancelled => components::RECONCILER,
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    components: HashMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared health state; clones observe the same components
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every scaler component as healthy
    pub async fn register_all(&self) {
        let mut state = self.state.write().await;
        for name in components::ALL {
            state
                .components
                .insert(name.to_string(), ComponentHealth::healthy());
        }
    }

    /// Every component answered during the tick
    pub async fn record_tick_success(&self) {
        let mut state = self.state.write().await;
        for health in state.components.values_mut() {
            *health = ComponentHealth::healthy();
        }
    }

    /// Charge a failed tick to the component that raised `error`
    pub async fn record_tick_failure(&self, error: &ScalerError) {
        let mut state = self.state.write().await;
        state
            .components
            .entry(component_for(error).to_string())
            .or_insert_with(ComponentHealth::healthy)
            .record_failure(error.to_string());
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
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

    /// Ready once the clients are built, until a component turns unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = self.state.read().await.ready;
        let reason = if !ready {
            Some("Scaler clients not yet initialized".to_string())
        } else if self.health().await.status == ComponentStatus::Unhealthy {
            Some("Scaler component unhealthy".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
