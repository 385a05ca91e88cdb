//! [`ClusterApi`] backed by the Kubernetes API server

use super::ClusterApi;
use crate::error::Result;
use crate::models::{NodeInfo, PodInfo, PodSelector};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::Client;
use tracing::debug;

/// Kubernetes client using kubeconfig or in-cluster credentials
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the default kubeconfig, falling back to in-cluster config
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let list = self.nodes().list(&ListParams::default()).await?;
        Ok(list.items.into_iter().filter_map(node_info).collect())
    }

    async fn list_pods(&self, namespace: &str, selector: &PodSelector) -> Result<Vec<PodInfo>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let mut params = ListParams::default();
        if let Some(labels) = &selector.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &selector.field_selector {
            params = params.fields(fields);
        }

        let list = pods.list(&params).await?;
        Ok(list.items.into_iter().map(pod_info).collect())
    }

    async fn cordon_node(&self, name: &str) -> Result<()> {
        let patch = serde_json::json!({ "spec": { "unschedulable": true } });
        self.nodes()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!(node = %name, "Node cordoned");
        Ok(())
    }

    async fn delete_node(&self, name: &str) -> Result<()> {
        self.nodes().delete(name, &DeleteParams::default()).await?;
        debug!(node = %name, "Node deleted");
        Ok(())
    }
}

fn node_info(node: Node) -> Option<NodeInfo> {
    let name = node.metadata.name?;
    Some(NodeInfo {
        name,
        labels: node.metadata.labels.unwrap_or_default(),
    })
}

fn pod_info(pod: Pod) -> PodInfo {
    PodInfo {
        name: pod.metadata.name.unwrap_or_default(),
        namespace: pod.metadata.namespace.unwrap_or_default(),
        phase: pod.status.and_then(|status| status.phase),
        node_name: pod.spec.and_then(|spec| spec.node_name),
        owner_kinds: pod
            .metadata
            .owner_references
            .unwrap_or_default()
            .into_iter()
            .map(|owner| owner.kind)
            .collect(),
    }
}
