//! In-memory collaborators for unit tests

use crate::clock::Clock;
use crate::cluster::ClusterApi;
use crate::error::{Result, ScalerError};
use crate::models::{AgentPool, ManagedCluster, NodeInfo, PodInfo, PodSelector};
use crate::pool::{PoolApi, ScaleToZero};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

pub fn node(name: &str, pool: &str) -> NodeInfo {
    NodeInfo {
        name: name.to_string(),
        labels: BTreeMap::from([("agentpool".to_string(), pool.to_string())]),
    }
}

pub fn pod(name: &str, namespace: &str, phase: &str, node: Option<&str>) -> PodInfo {
    PodInfo {
        name: name.to_string(),
        namespace: namespace.to_string(),
        phase: Some(phase.to_string()),
        node_name: node.map(str::to_string),
        owner_kinds: vec!["ReplicaSet".to_string()],
    }
}

fn api_failure(message: &str) -> ScalerError {
    ScalerError::Cluster(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

#[derive(Default)]
struct ClusterState {
    nodes: Vec<NodeInfo>,
    pods: Vec<PodInfo>,
    cordoned: Vec<String>,
    deleted: Vec<String>,
    selectors: Vec<PodSelector>,
    fail_listing: bool,
    fail_mutations: bool,
    evict_after: Option<usize>,
    drain_polls: usize,
}

/// Orchestrator double; pods on a node disappear after `evict_after` drain
/// polls when configured
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_nodes(&self, nodes: Vec<NodeInfo>) {
        self.state.lock().unwrap().nodes = nodes;
    }

    pub fn set_pods(&self, pods: Vec<PodInfo>) {
        self.state.lock().unwrap().pods = pods;
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.state.lock().unwrap().fail_mutations = fail;
    }

    pub fn evict_after(&self, polls: usize) {
        self.state.lock().unwrap().evict_after = Some(polls);
    }

    pub fn cordoned(&self) -> Vec<String> {
        self.state.lock().unwrap().cordoned.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn pod_selectors(&self) -> Vec<PodSelector> {
        self.state.lock().unwrap().selectors.clone()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(api_failure("list nodes failed"));
        }
        Ok(state.nodes.clone())
    }

    async fn list_pods(&self, namespace: &str, selector: &PodSelector) -> Result<Vec<PodInfo>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(api_failure("list pods failed"));
        }
        state.selectors.push(selector.clone());

        let node_filter = selector.field_selector.as_deref().and_then(|fields| {
            fields
                .split(',')
                .find_map(|f| f.strip_prefix("spec.nodeName="))
                .map(str::to_string)
        });

        if let Some(node) = &node_filter {
            state.drain_polls += 1;
            if let Some(limit) = state.evict_after {
                if state.drain_polls >= limit {
                    state
                        .pods
                        .retain(|p| p.node_name.as_deref() != Some(node.as_str()));
                }
            }
        }

        Ok(state
            .pods
            .iter()
            .filter(|p| p.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn cordon_node(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mutations {
            return Err(api_failure("patch node failed"));
        }
        state.cordoned.push(name.to_string());
        Ok(())
    }

    async fn delete_node(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mutations {
            return Err(api_failure("delete node failed"));
        }
        state.nodes.retain(|n| n.name != name);
        state.deleted.push(name.to_string());
        Ok(())
    }
}

/// Mutating calls observed by [`FakePool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolCall {
    Update {
        resource_group: String,
        cluster: String,
        count: u32,
    },
    ScaleToZero {
        resource_group: String,
        cluster: String,
        pool: String,
    },
}

struct PoolState {
    pool: AgentPool,
    calls: Vec<PoolCall>,
    gets: usize,
    failing_gets: usize,
}

/// Pool-management double that also implements the scale-to-zero path
pub struct FakePool {
    state: Mutex<PoolState>,
}

impl FakePool {
    pub fn new(pool: AgentPool) -> Self {
        Self {
            state: Mutex::new(PoolState {
                pool,
                calls: Vec::new(),
                gets: 0,
                failing_gets: 0,
            }),
        }
    }

    pub fn calls(&self) -> Vec<PoolCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn gets(&self) -> usize {
        self.state.lock().unwrap().gets
    }

    /// Make the next `n` pool reads fail
    pub fn fail_next_gets(&self, n: usize) {
        self.state.lock().unwrap().failing_gets = n;
    }

    pub fn pool(&self) -> AgentPool {
        self.state.lock().unwrap().pool.clone()
    }
}

#[async_trait]
impl PoolApi for FakePool {
    async fn get_managed_cluster(
        &self,
        _resource_group: &str,
        cluster_name: &str,
    ) -> Result<ManagedCluster> {
        Ok(ManagedCluster::new(cluster_name))
    }

    async fn get_agent_pool(
        &self,
        _resource_group: &str,
        _cluster_name: &str,
        _pool_name: &str,
    ) -> Result<AgentPool> {
        let mut state = self.state.lock().unwrap();
        state.gets += 1;
        if state.failing_gets > 0 {
            state.failing_gets -= 1;
            return Err(ScalerError::PoolStatus {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(state.pool.clone())
    }

    async fn create_or_update_agent_pool(
        &self,
        resource_group: &str,
        cluster_name: &str,
        pool: &AgentPool,
    ) -> Result<AgentPool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(PoolCall::Update {
            resource_group: resource_group.to_string(),
            cluster: cluster_name.to_string(),
            count: pool.count(),
        });
        state.pool.set_count(pool.count());
        Ok(state.pool.clone())
    }
}

#[async_trait]
impl ScaleToZero for FakePool {
    async fn scale_to_zero(
        &self,
        resource_group: &str,
        cluster_name: &str,
        pool_name: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(PoolCall::ScaleToZero {
            resource_group: resource_group.to_string(),
            cluster: cluster_name.to_string(),
            pool: pool_name.to_string(),
        });
        state.pool.set_count(0);
        Ok(())
    }
}

/// Clock whose `sleep` advances simulated time instead of waiting
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
    }

    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
