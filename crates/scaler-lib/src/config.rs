//! Scaler configuration
//!
//! The parameter set is loaded once at startup and never mutated. Loading
//! from disk and the environment lives in the binary; this type only
//! describes the options, their defaults and their validation.

use crate::error::{Result, ScalerError};
use crate::models::{DownScalingStrategy, PodPhase};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scaling parameters for a single agent pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerConfig {
    /// Name of the agent pool to manage
    pub agent_pool_name: String,

    pub azure_subscription_id: String,

    pub azure_resource_group_name: String,

    pub aks_cluster_name: String,

    /// Namespace whose pods are counted toward the queue
    pub default_namespace: String,

    /// Queue depth above which the pool grows and below which it shrinks
    #[serde(default = "default_max_pod_queue")]
    pub max_pod_queue: u32,

    #[serde(default = "default_delay_before_scale_up")]
    pub delay_before_scale_up_secs: u64,

    #[serde(default = "default_delay_before_scale_down")]
    pub delay_before_scale_down_secs: u64,

    /// Loop tick interval
    #[serde(default = "default_periodic_check_rate")]
    pub periodic_check_rate_secs: u64,

    /// Maximum wait before a cordoned node is deleted regardless of its pods
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// `latest` or `oldest`; parsed when a scale-down is evaluated
    #[serde(default = "default_down_scaling_strategy")]
    pub down_scaling_strategy: String,

    /// Phase counted as queued
    #[serde(default = "default_pod_phase")]
    pub pod_phase: PodPhase,

    /// Namespace inspected for running pods while draining
    #[serde(default = "default_drain_namespace")]
    pub drain_namespace: String,

    /// Node label carrying the agent pool name
    #[serde(default = "default_pool_label")]
    pub pool_label: String,

    /// Health/metrics listener port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Azure Resource Manager base URL
    #[serde(default = "default_arm_endpoint")]
    pub arm_endpoint: String,
}

fn default_max_pod_queue() -> u32 {
    10
}

fn default_delay_before_scale_up() -> u64 {
    100
}

fn default_delay_before_scale_down() -> u64 {
    300
}

fn default_periodic_check_rate() -> u64 {
    1
}

fn default_drain_timeout() -> u64 {
    60
}

fn default_down_scaling_strategy() -> String {
    "latest".to_string()
}

fn default_pod_phase() -> PodPhase {
    PodPhase::Queued
}

fn default_drain_namespace() -> String {
    "monitoring".to_string()
}

fn default_pool_label() -> String {
    "agentpool".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_arm_endpoint() -> String {
    "https://management.azure.com".to_string()
}

impl ScalerConfig {
    /// Build a configuration with every optional setting at its default
    pub fn new(
        agent_pool_name: impl Into<String>,
        azure_subscription_id: impl Into<String>,
        azure_resource_group_name: impl Into<String>,
        aks_cluster_name: impl Into<String>,
        default_namespace: impl Into<String>,
    ) -> Self {
        Self {
            agent_pool_name: agent_pool_name.into(),
            azure_subscription_id: azure_subscription_id.into(),
            azure_resource_group_name: azure_resource_group_name.into(),
            aks_cluster_name: aks_cluster_name.into(),
            default_namespace: default_namespace.into(),
            max_pod_queue: default_max_pod_queue(),
            delay_before_scale_up_secs: default_delay_before_scale_up(),
            delay_before_scale_down_secs: default_delay_before_scale_down(),
            periodic_check_rate_secs: default_periodic_check_rate(),
            drain_timeout_secs: default_drain_timeout(),
            down_scaling_strategy: default_down_scaling_strategy(),
            pod_phase: default_pod_phase(),
            drain_namespace: default_drain_namespace(),
            pool_label: default_pool_label(),
            api_port: default_api_port(),
            arm_endpoint: default_arm_endpoint(),
        }
    }

    /// Check the settings that must hold before the loop starts.
    ///
    /// The down-scaling strategy is resolved per tick by [`Self::strategy`].
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("agent_pool_name", &self.agent_pool_name),
            ("azure_subscription_id", &self.azure_subscription_id),
            ("azure_resource_group_name", &self.azure_resource_group_name),
            ("aks_cluster_name", &self.aks_cluster_name),
            ("default_namespace", &self.default_namespace),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ScalerError::config(format!("{} must not be empty", key)));
            }
        }

        if self.periodic_check_rate_secs == 0 {
            return Err(ScalerError::config(
                "periodic_check_rate_secs must be greater than zero",
            ));
        }

        Ok(())
    }

    pub fn strategy(&self) -> Result<DownScalingStrategy> {
        self.down_scaling_strategy.parse()
    }

    pub fn scale_up_delay(&self) -> Duration {
        Duration::from_secs(self.delay_before_scale_up_secs)
    }

    pub fn scale_down_delay(&self) -> Duration {
        Duration::from_secs(self.delay_before_scale_down_secs)
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.periodic_check_rate_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
