//! Reconciliation loop
//!
//! Re-reads the pool descriptor every poll period, runs the decision
//! engine, and threads the last scaling event time into the next tick.
//! Any failure inside a tick is logged and absorbed here so the loop keeps
//! running with the event time it had before the tick.

use crate::clock::{Clock, Shutdown, SystemClock};
use crate::cluster::ClusterApi;
use crate::config::ScalerConfig;
use crate::drain::DrainController;
use crate::engine::{Evaluation, ScalingAction, ScalingEngine};
use crate::error::{Result, ScalerError};
use crate::health::HealthRegistry;
use crate::models::ManagedCluster;
use crate::observability::{ScalerLogger, ScalerMetrics};
use crate::pool::{current_pool, PoolApi, PoolResizer, ScaleToZero};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::info;

/// Periodic driver for the scaling engine
pub struct ReconcileLoop {
    config: Arc<ScalerConfig>,
    cluster: ManagedCluster,
    pool_api: Arc<dyn PoolApi>,
    engine: ScalingEngine,
    clock: Arc<dyn Clock>,
    health: HealthRegistry,
    metrics: ScalerMetrics,
    logger: ScalerLogger,
}

impl ReconcileLoop {
    /// Run until a shutdown signal arrives
    pub async fn run(self, shutdown: broadcast::Receiver<()>) {
        info!(
            pool = %self.config.agent_pool_name,
            cluster = %self.cluster.name,
            interval_secs = self.config.periodic_check_rate_secs,
            "Starting reconciliation loop"
        );

        let mut shutdown = Shutdown::new(shutdown);
        let mut last_event_time = self.clock.now();

        loop {
            if shutdown.is_requested() {
                break;
            }

            match self.run_once(last_event_time, &mut shutdown).await {
                Ok(next) => last_event_time = next,
                Err(_) => break,
            }

            tokio::select! {
                _ = self.clock.sleep(self.config.poll_period()) => {}
                _ = shutdown.wait() => break,
            }
        }

        info!("Shutting down reconciliation loop");
    }

    /// Run one tick, absorbing every failure except cancellation.
    ///
    /// Returns the event time to carry into the next tick.
    pub async fn run_once(
        &self,
        last_event_time: DateTime<Utc>,
        shutdown: &mut Shutdown,
    ) -> Result<DateTime<Utc>> {
        let start = Instant::now();
        let outcome = self.tick(last_event_time, shutdown).await;
        self.metrics.observe_tick(start.elapsed().as_secs_f64());

        match outcome {
            Ok(evaluation) => {
                self.record(&evaluation).await;
                Ok(evaluation.last_event_time)
            }
            Err(ScalerError::Cancelled) => Err(ScalerError::Cancelled),
            Err(e) => {
                self.logger.log_tick_failure(e.kind(), &e);
                self.metrics.inc_tick_errors(e.kind());
                self.health.record_tick_failure(&e).await;
                Ok(last_event_time)
            }
        }
    }

    async fn tick(
        &self,
        last_event_time: DateTime<Utc>,
        shutdown: &mut Shutdown,
    ) -> Result<Evaluation> {
        let pool = current_pool(self.pool_api.as_ref(), &self.cluster, &self.config).await?;
        let now = self.clock.now();
        self.engine
            .evaluate(pool, &self.cluster, last_event_time, &self.config, now, shutdown)
            .await
    }

    async fn record(&self, evaluation: &Evaluation) {
        match &evaluation.action {
            ScalingAction::Skipped(reason) => self.logger.log_skip(&reason.to_string()),
            ScalingAction::Held { .. } => {}
            ScalingAction::ScaledUp { from, to, queued } => {
                self.logger.log_scale_up(*from, *to, *queued);
                self.metrics.inc_scale_up();
            }
            ScalingAction::ScaledDown {
                from,
                to,
                queued,
                drain,
            } => {
                self.logger.log_scale_down(*from, *to, *queued, drain);
                self.metrics.record_scale_down(drain);
            }
        }

        if let Some(queued) = evaluation.action.queued() {
            self.metrics.set_queued_pods(queued as i64);
        }
        self.metrics.set_pool_size(evaluation.pool_count as i64);
        self.health.record_tick_success().await;
    }
}

/// Builder for wiring the loop's collaborators
pub struct ReconcileLoopBuilder {
    config: Option<Arc<ScalerConfig>>,
    cluster: Option<ManagedCluster>,
    cluster_api: Option<Arc<dyn ClusterApi>>,
    pool_api: Option<Arc<dyn PoolApi>>,
    scale_to_zero: Option<Arc<dyn ScaleToZero>>,
    clock: Arc<dyn Clock>,
    health: HealthRegistry,
    metrics: ScalerMetrics,
}

impl ReconcileLoopBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            cluster: None,
            cluster_api: None,
            pool_api: None,
            scale_to_zero: None,
            clock: Arc::new(SystemClock),
            health: HealthRegistry::new(),
            metrics: ScalerMetrics::new(),
        }
    }

    pub fn config(mut self, config: Arc<ScalerConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the managed cluster the pool belongs to
    pub fn managed_cluster(mut self, cluster: ManagedCluster) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn cluster_api(mut self, api: Arc<dyn ClusterApi>) -> Self {
        self.cluster_api = Some(api);
        self
    }

    pub fn pool_api(mut self, api: Arc<dyn PoolApi>) -> Self {
        self.pool_api = Some(api);
        self
    }

    pub fn scale_to_zero(mut self, zero: Arc<dyn ScaleToZero>) -> Self {
        self.scale_to_zero = Some(zero);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn metrics(mut self, metrics: ScalerMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> Result<ReconcileLoop> {
        let config = self
            .config
            .ok_or_else(|| ScalerError::config("scaler configuration is required"))?;
        let cluster = self
            .cluster
            .ok_or_else(|| ScalerError::config("managed cluster is required"))?;
        let cluster_api = self
            .cluster_api
            .ok_or_else(|| ScalerError::config("cluster API client is required"))?;
        let pool_api = self
            .pool_api
            .ok_or_else(|| ScalerError::config("pool API client is required"))?;
        let scale_to_zero = self
            .scale_to_zero
            .ok_or_else(|| ScalerError::config("scale-to-zero command is required"))?;

        let resizer = PoolResizer::new(pool_api.clone(), scale_to_zero);
        let drain = DrainController::new(cluster_api.clone(), self.clock.clone());
        let engine = ScalingEngine::new(cluster_api, resizer, drain);

        Ok(ReconcileLoop {
            logger: ScalerLogger::new(config.agent_pool_name.clone()),
            config,
            cluster,
            pool_api,
            engine,
            clock: self.clock,
            health: self.health,
            metrics: self.metrics,
        })
    }
}

impl Default for ReconcileLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
