//! Azure Resource Manager client for managed clusters and agent pools

use super::{PoolApi, TokenSource};
use crate::error::{Result, ScalerError};
use crate::models::{AgentPool, ManagedCluster};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Container service API version used for every call
pub const ARM_API_VERSION: &str = "2023-08-01";

/// Pool API speaking the ARM REST protocol
pub struct ArmPoolApi {
    client: Client,
    base_url: Url,
    subscription_id: String,
    tokens: Arc<dyn TokenSource>,
}

impl ArmPoolApi {
    pub fn new(
        base_url: &str,
        subscription_id: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let base_url = Url::parse(base_url)
            .map_err(|e| ScalerError::config(format!("invalid ARM endpoint {}: {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            subscription_id: subscription_id.into(),
            tokens,
        })
    }

    fn cluster_path(&self, resource_group: &str, cluster_name: &str) -> String {
        format!(
            "subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}",
            self.subscription_id, resource_group, cluster_name
        )
    }

    fn url(&self, path: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| ScalerError::config(format!("invalid resource path {}: {}", path, e)))?;
        url.query_pairs_mut()
            .append_pair("api-version", ARM_API_VERSION);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &'static str) -> Result<T> {
        let url = self.url(path)?;
        let token = self.tokens.token().await?;

        let response = self.client.get(url).bearer_auth(token).send().await?;
        decode(response, what).await
    }

    async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
        what: &'static str,
    ) -> Result<T> {
        let url = self.url(path)?;
        let token = self.tokens.token().await?;

        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        decode(response, what).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response, what: &'static str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ScalerError::PoolStatus {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|source| ScalerError::Decode { what, source })
}

#[async_trait]
impl PoolApi for ArmPoolApi {
    async fn get_managed_cluster(
        &self,
        resource_group: &str,
        cluster_name: &str,
    ) -> Result<ManagedCluster> {
        let path = self.cluster_path(resource_group, cluster_name);
        self.get(&path, "managed cluster").await
    }

    async fn get_agent_pool(
        &self,
        resource_group: &str,
        cluster_name: &str,
        pool_name: &str,
    ) -> Result<AgentPool> {
        let path = format!(
            "{}/agentPools/{}",
            self.cluster_path(resource_group, cluster_name),
            pool_name
        );
        self.get(&path, "agent pool").await
    }

    async fn create_or_update_agent_pool(
        &self,
        resource_group: &str,
        cluster_name: &str,
        pool: &AgentPool,
    ) -> Result<AgentPool> {
        let path = format!(
            "{}/agentPools/{}",
            self.cluster_path(resource_group, cluster_name),
            pool.name
        );
        self.put(&path, pool, "agent pool").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::StaticTokenSource;
    use mockito::Matcher;

    const POOL_PATH: &str = "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.ContainerService/managedClusters/cluster1/agentPools/pool1";

    fn api(server: &mockito::Server) -> ArmPoolApi {
        ArmPoolApi::new(
            &server.url(),
            "sub",
            Arc::new(StaticTokenSource::new("test-token")),
        )
        .unwrap()
    }

    fn pool_body(count: u32, state: &str) -> String {
        serde_json::json!({
            "id": POOL_PATH,
            "name": "pool1",
            "properties": {
                "count": count,
                "enableAutoScaling": false,
                "provisioningState": state,
                "vmSize": "Standard_D4s_v3"
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_get_managed_cluster() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.ContainerService/managedClusters/cluster1",
            )
            .match_query(Matcher::UrlEncoded(
                "api-version".into(),
                ARM_API_VERSION.into(),
            ))
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(r#"{"id": "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.ContainerService/managedClusters/cluster1", "name": "cluster1", "location": "westeurope", "properties": {}}"#)
            .create_async()
            .await;

        let cluster = api(&server)
            .get_managed_cluster("rg1", "cluster1")
            .await
            .unwrap();

        assert_eq!(cluster.name, "cluster1");
        assert_eq!(cluster.location.as_deref(), Some("westeurope"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_agent_pool() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", POOL_PATH)
            .match_query(Matcher::UrlEncoded(
                "api-version".into(),
                ARM_API_VERSION.into(),
            ))
            .with_status(200)
            .with_body(pool_body(3, "Updating"))
            .create_async()
            .await;

        let pool = api(&server)
            .get_agent_pool("rg1", "cluster1", "pool1")
            .await
            .unwrap();

        assert_eq!(pool.count(), 3);
        assert!(!pool.provisioning_state().is_settled());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_sends_unmodelled_properties() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", POOL_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "name": "pool1",
                "properties": { "count": 4, "vmSize": "Standard_D4s_v3" }
            })))
            .with_status(200)
            .with_body(pool_body(4, "Scaling"))
            .create_async()
            .await;

        let mut pool: AgentPool = serde_json::from_str(&pool_body(3, "Succeeded")).unwrap();
        pool.set_count(4);

        let updated = api(&server)
            .create_or_update_agent_pool("rg1", "cluster1", &pool)
            .await
            .unwrap();

        assert_eq!(updated.count(), 4);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", POOL_PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": {"code": "NotFound"}}"#)
            .create_async()
            .await;

        let err = api(&server)
            .get_agent_pool("rg1", "cluster1", "pool1")
            .await
            .unwrap_err();

        match err {
            ScalerError::PoolStatus { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("NotFound"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", POOL_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let err = api(&server)
            .get_agent_pool("rg1", "cluster1", "pool1")
            .await
            .unwrap_err();
        assert!(matches!(err, ScalerError::Decode { .. }));
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = ArmPoolApi::new("not a url", "sub", Arc::new(StaticTokenSource::new("t")));
        assert!(matches!(result, Err(ScalerError::Config(_))));
    }
}
