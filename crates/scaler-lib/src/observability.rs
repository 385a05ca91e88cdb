//! Observability infrastructure for the pool scaler
//!
//! Provides:
//! - Prometheus metrics (tick outcomes, scaling events, queue depth, drain latency)
//! - Structured JSON logging with tracing

use crate::drain::DrainReport;
use prometheus::proto::MetricFamily;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for tick durations (in seconds)
const TICK_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Histogram buckets for drain waits (in seconds)
const DRAIN_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    ticks: IntCounter,
    tick_errors: IntCounterVec,
    scale_ups: IntCounter,
    scale_downs: IntCounter,
    drain_timeouts: IntCounter,
    queued_pods: IntGauge,
    pool_size: IntGauge,
    tick_duration_seconds: Histogram,
    drain_duration_seconds: Histogram,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            ticks: register_int_counter!(
                "aks_pool_scaler_ticks_total",
                "Number of reconciliation ticks run"
            )
            .expect("Failed to register ticks_total"),

            tick_errors: register_int_counter_vec!(
                "aks_pool_scaler_tick_errors_total",
                "Number of reconciliation ticks abandoned due to an error",
                &["kind"]
            )
            .expect("Failed to register tick_errors_total"),

            scale_ups: register_int_counter!(
                "aks_pool_scaler_scale_up_total",
                "Number of scale-up events"
            )
            .expect("Failed to register scale_up_total"),

            scale_downs: register_int_counter!(
                "aks_pool_scaler_scale_down_total",
                "Number of scale-down events"
            )
            .expect("Failed to register scale_down_total"),

            drain_timeouts: register_int_counter!(
                "aks_pool_scaler_drain_timeouts_total",
                "Number of nodes deleted after the drain timeout with pods still running"
            )
            .expect("Failed to register drain_timeouts_total"),

            queued_pods: register_int_gauge!(
                "aks_pool_scaler_queued_pods",
                "Pods in the queued phase at the last tick"
            )
            .expect("Failed to register queued_pods"),

            pool_size: register_int_gauge!(
                "aks_pool_scaler_pool_size",
                "Desired node count of the pool after the last tick"
            )
            .expect("Failed to register pool_size"),

            tick_duration_seconds: register_histogram!(
                "aks_pool_scaler_tick_duration_seconds",
                "Time spent in a reconciliation tick",
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_duration_seconds"),

            drain_duration_seconds: register_histogram!(
                "aks_pool_scaler_drain_duration_seconds",
                "Time spent waiting for a node to drain",
                DRAIN_BUCKETS.to_vec()
            )
            .expect("Failed to register drain_duration_seconds"),
        }
    }
}

/// Scaler metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_tick(&self, duration_secs: f64) {
        self.inner().ticks.inc();
        self.inner().tick_duration_seconds.observe(duration_secs);
    }

    pub fn inc_tick_errors(&self, kind: &str) {
        self.inner().tick_errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_scale_up(&self) {
        self.inner().scale_ups.inc();
    }

    pub fn record_scale_down(&self, drain: &DrainReport) {
        self.inner().scale_downs.inc();
        self.inner()
            .drain_duration_seconds
            .observe(drain.waited.as_secs_f64());
        if drain.forced {
            self.inner().drain_timeouts.inc();
        }
    }

    pub fn set_queued_pods(&self, count: i64) {
        self.inner().queued_pods.set(count);
    }

    pub fn set_pool_size(&self, count: i64) {
        self.inner().pool_size.set(count);
    }

    /// Snapshot of every family in the default registry
    pub fn gather(&self) -> Vec<MetricFamily> {
        prometheus::gather()
    }
}

/// Structured logger for scaler events
#[derive(Clone)]
pub struct ScalerLogger {
    pool: String,
}

impl ScalerLogger {
    pub fn new(pool: impl Into<String>) -> Self {
        Self { pool: pool.into() }
    }

    pub fn log_startup(&self, version: &str, cluster: &str) {
        info!(
            event = "scaler_started",
            pool = %self.pool,
            cluster = %cluster,
            version = %version,
            "Pool scaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scaler_shutdown",
            pool = %self.pool,
            reason = %reason,
            "Pool scaler shutting down"
        );
    }

    pub fn log_scale_up(&self, from: u32, to: u32, queued: usize) {
        info!(
            event = "scale_up",
            pool = %self.pool,
            from = from,
            to = to,
            queued = queued,
            "Scaling up the agent pool"
        );
    }

    pub fn log_scale_down(&self, from: u32, to: u32, queued: usize, drain: &DrainReport) {
        if drain.forced {
            warn!(
                event = "drain_timeout",
                pool = %self.pool,
                node = %drain.node,
                remaining = ?drain.remaining,
                waited_secs = drain.waited.as_secs(),
                "Node deleted with pods still running"
            );
        }
        info!(
            event = "scale_down",
            pool = %self.pool,
            node = %drain.node,
            from = from,
            to = to,
            queued = queued,
            "Scaling down the agent pool, node already deleted, syncing pool size"
        );
    }

    pub fn log_skip(&self, reason: &str) {
        warn!(
            event = "tick_skipped",
            pool = %self.pool,
            reason = %reason,
            "Leaving agent pool untouched"
        );
    }

    pub fn log_tick_failure(&self, kind: &str, error: &dyn std::error::Error) {
        error!(
            event = "tick_failed",
            pool = %self.pool,
            kind = %kind,
            error = %error,
            "Reconciliation tick failed"
        );
    }
}
