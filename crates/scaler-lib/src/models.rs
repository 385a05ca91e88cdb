//! Core data models for the pool scaler

use crate::error::{Result, ScalerError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Provisioning state reported by the control plane for an agent pool
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProvisioningState {
    Succeeded,
    Creating,
    Updating,
    Scaling,
    Upgrading,
    Deleting,
    Failed,
    Canceled,
    #[default]
    Unknown,
    Other(String),
}

impl ProvisioningState {
    /// Only a settled pool may be mutated
    pub fn is_settled(&self) -> bool {
        matches!(self, ProvisioningState::Succeeded)
    }
}

impl From<String> for ProvisioningState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Succeeded" => ProvisioningState::Succeeded,
            "Creating" => ProvisioningState::Creating,
            "Updating" => ProvisioningState::Updating,
            "Scaling" => ProvisioningState::Scaling,
            "Upgrading" => ProvisioningState::Upgrading,
            "Deleting" => ProvisioningState::Deleting,
            "Failed" => ProvisioningState::Failed,
            "Canceled" => ProvisioningState::Canceled,
            "" | "Unknown" => ProvisioningState::Unknown,
            _ => ProvisioningState::Other(value),
        }
    }
}

impl From<ProvisioningState> for String {
    fn from(value: ProvisioningState) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisioningState::Succeeded => write!(f, "Succeeded"),
            ProvisioningState::Creating => write!(f, "Creating"),
            ProvisioningState::Updating => write!(f, "Updating"),
            ProvisioningState::Scaling => write!(f, "Scaling"),
            ProvisioningState::Upgrading => write!(f, "Upgrading"),
            ProvisioningState::Deleting => write!(f, "Deleting"),
            ProvisioningState::Failed => write!(f, "Failed"),
            ProvisioningState::Canceled => write!(f, "Canceled"),
            ProvisioningState::Unknown => write!(f, "Unknown"),
            ProvisioningState::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Agent pool properties as exchanged with Azure Resource Manager.
///
/// Properties the scaler does not interpret are kept in `extra` so an
/// update writes them back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPoolProperties {
    #[serde(default)]
    pub count: u32,

    #[serde(rename = "enableAutoScaling", default)]
    pub enable_auto_scaling: bool,

    #[serde(rename = "provisioningState", default, skip_serializing)]
    pub provisioning_state: ProvisioningState,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Snapshot of a managed agent pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub properties: AgentPoolProperties,
}

impl AgentPool {
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            id: None,
            name: name.into(),
            properties: AgentPoolProperties {
                count,
                enable_auto_scaling: false,
                provisioning_state: ProvisioningState::Succeeded,
                extra: serde_json::Map::new(),
            },
        }
    }

    pub fn count(&self) -> u32 {
        self.properties.count
    }

    pub fn set_count(&mut self, count: u32) {
        self.properties.count = count;
    }

    pub fn autoscaling_enabled(&self) -> bool {
        self.properties.enable_auto_scaling
    }

    pub fn provisioning_state(&self) -> &ProvisioningState {
        &self.properties.provisioning_state
    }
}

/// Handle identifying the cluster that owns the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedCluster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ManagedCluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            location: None,
        }
    }
}

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Queued,
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Queued => "Queued",
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PodPhase {
    type Err = ScalerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Queued" => Ok(PodPhase::Queued),
            "Pending" => Ok(PodPhase::Pending),
            "Running" => Ok(PodPhase::Running),
            "Succeeded" => Ok(PodPhase::Succeeded),
            "Failed" => Ok(PodPhase::Failed),
            "Unknown" => Ok(PodPhase::Unknown),
            other => Err(ScalerError::config(format!("unknown pod phase: {}", other))),
        }
    }
}

/// Which node of the pool to remove when scaling down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownScalingStrategy {
    /// Remove the last node in name order
    Latest,
    /// Remove the first node in name order
    Oldest,
}

impl DownScalingStrategy {
    /// Pick a removal candidate, or `None` when the pool has no visible nodes
    pub fn select<'a>(&self, nodes: &'a BTreeSet<String>) -> Option<&'a str> {
        let node = match self {
            DownScalingStrategy::Latest => nodes.iter().next_back(),
            DownScalingStrategy::Oldest => nodes.iter().next(),
        };
        node.map(String::as_str)
    }
}

impl FromStr for DownScalingStrategy {
    type Err = ScalerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "latest" => Ok(DownScalingStrategy::Latest),
            "oldest" => Ok(DownScalingStrategy::Oldest),
            other => Err(ScalerError::config(format!(
                "unknown down-scaling strategy: {}",
                other
            ))),
        }
    }
}

/// Node as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Pod as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    /// Raw phase string; may be absent for pods without status
    pub phase: Option<String>,
    pub node_name: Option<String>,
    /// Kinds of the owning controllers (e.g. `ReplicaSet`, `DaemonSet`)
    pub owner_kinds: Vec<String>,
}

impl PodInfo {
    pub fn is_daemon_owned(&self) -> bool {
        self.owner_kinds.iter().any(|k| k == "DaemonSet")
    }
}

/// Server-side filters for a pod listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodSelector {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}
