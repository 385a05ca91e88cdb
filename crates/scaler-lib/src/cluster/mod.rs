//! Orchestrator-side collaborator
//!
//! The [`ClusterApi`] trait is the transport seam; the reader functions
//! below turn raw listings into the views the decision engine needs.

mod kube_api;

pub use kube_api::KubeClusterApi;

use crate::error::Result;
use crate::models::{NodeInfo, PodInfo, PodPhase, PodSelector};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Label selector excluding pods created by a DaemonSet
pub const NON_DAEMON_SELECTOR: &str = "kubernetes.io/created-by!=DaemonSet";

/// Operations the scaler needs from the orchestrator API
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List every node visible to the orchestrator
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>>;

    /// List pods in a namespace, filtered server-side by `selector`
    async fn list_pods(&self, namespace: &str, selector: &PodSelector) -> Result<Vec<PodInfo>>;

    /// Mark a node unschedulable
    async fn cordon_node(&self, name: &str) -> Result<()>;

    /// Remove a node object from the orchestrator
    async fn delete_node(&self, name: &str) -> Result<()>;
}

/// Count pods in `namespace` whose phase equals `phase`
pub async fn count_workloads_in_phase(
    api: &dyn ClusterApi,
    namespace: &str,
    phase: PodPhase,
) -> Result<usize> {
    let pods = api.list_pods(namespace, &PodSelector::default()).await?;
    Ok(pods
        .iter()
        .filter(|pod| pod.phase.as_deref() == Some(phase.as_str()))
        .count())
}

/// Names of the nodes labelled as members of `pool_name`, deduplicated
/// and in name order
pub async fn nodes_in_pool(
    api: &dyn ClusterApi,
    pool_label: &str,
    pool_name: &str,
) -> Result<BTreeSet<String>> {
    let nodes = api.list_nodes().await?;
    Ok(nodes
        .into_iter()
        .filter(|node| node.labels.get(pool_label).map(String::as_str) == Some(pool_name))
        .map(|node| node.name)
        .collect())
}

/// Running, non-daemon pods in `namespace` scheduled on `node`
pub async fn workloads_on_node(
    api: &dyn ClusterApi,
    namespace: &str,
    node: &str,
) -> Result<Vec<String>> {
    let selector = PodSelector {
        label_selector: Some(NON_DAEMON_SELECTOR.to_string()),
        field_selector: Some(format!(
            "spec.nodeName={},status.phase={}",
            node,
            PodPhase::Running
        )),
    };

    let pods = api.list_pods(namespace, &selector).await?;

    // The server applies the selectors; re-check in case the label is missing
    Ok(pods
        .into_iter()
        .filter(|pod| pod.node_name.as_deref() == Some(node))
        .filter(|pod| pod.phase.as_deref() == Some(PodPhase::Running.as_str()))
        .filter(|pod| !pod.is_daemon_owned())
        .map(|pod| pod.name)
        .collect())
}
