//! Cloud-side collaborator for the managed agent pool
//!
//! This module provides:
//! - [`PoolApi`], the pool-management transport seam, with an Azure
//!   Resource Manager implementation
//! - [`ScaleToZero`], the dedicated zero-size path, with an `az` CLI
//!   implementation
//! - [`PoolResizer`], which applies desired sizes through both

mod arm;
mod az_cli;
mod credentials;

pub use arm::{ArmPoolApi, ARM_API_VERSION};
pub use az_cli::{AzCli, AzCliScaleToZero};
pub use credentials::{AzCliTokenSource, StaticTokenSource, TokenSource};

use crate::config::ScalerConfig;
use crate::error::Result;
use crate::models::{AgentPool, ManagedCluster};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Operations the scaler needs from the pool-management API
#[async_trait]
pub trait PoolApi: Send + Sync {
    async fn get_managed_cluster(
        &self,
        resource_group: &str,
        cluster_name: &str,
    ) -> Result<ManagedCluster>;

    async fn get_agent_pool(
        &self,
        resource_group: &str,
        cluster_name: &str,
        pool_name: &str,
    ) -> Result<AgentPool>;

    /// Submit `pool` as the new pool definition. The resize proceeds
    /// asynchronously on the control plane.
    async fn create_or_update_agent_pool(
        &self,
        resource_group: &str,
        cluster_name: &str,
        pool: &AgentPool,
    ) -> Result<AgentPool>;
}

/// Resizes a pool to zero nodes, which the generic update cannot do
#[async_trait]
pub trait ScaleToZero: Send + Sync {
    async fn scale_to_zero(
        &self,
        resource_group: &str,
        cluster_name: &str,
        pool_name: &str,
    ) -> Result<()>;
}

/// Fetch the current descriptor of the configured pool
pub async fn current_pool(
    api: &dyn PoolApi,
    cluster: &ManagedCluster,
    config: &ScalerConfig,
) -> Result<AgentPool> {
    api.get_agent_pool(
        &config.azure_resource_group_name,
        &cluster.name,
        &config.agent_pool_name,
    )
    .await
}

/// Applies desired node counts to the pool
#[derive(Clone)]
pub struct PoolResizer {
    api: Arc<dyn PoolApi>,
    zero: Arc<dyn ScaleToZero>,
}

impl PoolResizer {
    pub fn new(api: Arc<dyn PoolApi>, zero: Arc<dyn ScaleToZero>) -> Self {
        Self { api, zero }
    }

    /// Submit the in-memory pool count; other fields are sent back unchanged
    pub async fn apply_pool_size(
        &self,
        pool: &AgentPool,
        cluster: &ManagedCluster,
        config: &ScalerConfig,
    ) -> Result<()> {
        info!(
            pool = %pool.name,
            cluster = %cluster.name,
            count = pool.count(),
            "Submitting agent pool size"
        );
        self.api
            .create_or_update_agent_pool(&config.azure_resource_group_name, &cluster.name, pool)
            .await?;
        Ok(())
    }

    /// Request a resize to zero without waiting for it to finish
    pub async fn scale_to_zero(
        &self,
        pool: &AgentPool,
        cluster: &ManagedCluster,
        resource_group: &str,
    ) -> Result<()> {
        info!(pool = %pool.name, cluster = %cluster.name, "Scaling agent pool to zero");
        self.zero
            .scale_to_zero(resource_group, &cluster.name, &pool.name)
            .await
    }
}
