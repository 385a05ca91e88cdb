//! AKS Pool Scaler - queue-depth autoscaler for a single agent pool
//!
//! This binary runs as a long-lived daemon, growing the pool while queued
//! pods exceed the configured threshold and draining nodes when it drops
//! below.

use aks_pool_scaler::{api, config};
use anyhow::{Context, Result};
use scaler_lib::{
    cluster::KubeClusterApi,
    health::HealthRegistry,
    observability::{ScalerLogger, ScalerMetrics},
    pool::{
        ArmPoolApi, AzCli, AzCliScaleToZero, AzCliTokenSource, PoolApi, StaticTokenSource,
        TokenSource,
    },
    ReconcileLoopBuilder,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pre-issued management token; the `az` CLI is used when unset
const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting aks-pool-scaler");

    let config = Arc::new(config::load()?);
    info!(
        pool = %config.agent_pool_name,
        cluster = %config.aks_cluster_name,
        resource_group = %config.azure_resource_group_name,
        "Scaler configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = ScalerMetrics::new();
    let logger = ScalerLogger::new(&config.agent_pool_name);

    // Build long-lived clients
    let cluster_api = Arc::new(
        KubeClusterApi::try_default()
            .await
            .context("Failed to connect to the Kubernetes API")?,
    );

    let tokens: Arc<dyn TokenSource> = match std::env::var(ACCESS_TOKEN_ENV) {
        Ok(token) => Arc::new(StaticTokenSource::new(token)),
        Err(_) => Arc::new(AzCliTokenSource::new(
            AzCli::default(),
            &config.arm_endpoint,
        )),
    };
    let pool_api = Arc::new(ArmPoolApi::new(
        &config.arm_endpoint,
        config.azure_subscription_id.clone(),
        tokens,
    )?);

    let managed_cluster = pool_api
        .get_managed_cluster(&config.azure_resource_group_name, &config.aks_cluster_name)
        .await
        .context("Failed to fetch the managed cluster")?;

    logger.log_startup(SCALER_VERSION, &managed_cluster.name);

    let reconciler = ReconcileLoopBuilder::new()
        .config(config.clone())
        .managed_cluster(managed_cluster)
        .cluster_api(cluster_api)
        .pool_api(pool_api)
        .scale_to_zero(Arc::new(AzCliScaleToZero::new(AzCli::default())))
        .health(health_registry.clone())
        .metrics(metrics.clone())
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));

    // Mark scaler as ready after initialization
    health_registry.set_ready(true).await;

    // Start health and metrics server
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(reconciler.run(shutdown_rx));

    // A server failure (e.g. the port is taken) stops the daemon
    let outcome = tokio::select! {
        signal = shutdown_signal() => signal.map(|reason| logger.log_shutdown(reason)),
        joined = &mut api_handle => {
            logger.log_shutdown("API server stopped");
            Err(api::server_exit(joined))
        }
    };
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        error!(error = %e, "Reconciliation loop panicked");
    }
    api_handle.abort();

    info!("Shutting down");
    outcome
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT received")
            }
            _ = terminate.recv() => Ok("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT received")
    }
}
