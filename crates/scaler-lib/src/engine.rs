//! Scaling decision engine
//!
//! One evaluation compares the queued-pod count against the configured
//! threshold and, once the hysteresis delay since the last scaling event
//! has passed, grows the pool by one node or drains and removes one node.
//! The last event time is the only state carried between evaluations; it
//! is passed in and handed back rather than stored.

use crate::clock::{elapsed_since, Shutdown};
use crate::cluster::{count_workloads_in_phase, nodes_in_pool, ClusterApi};
use crate::config::ScalerConfig;
use crate::drain::{DrainController, DrainReport};
use crate::error::Result;
use crate::models::{AgentPool, ManagedCluster, ProvisioningState};
use crate::pool::PoolResizer;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Why an evaluation left the pool alone without looking at the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The platform autoscaler owns the pool
    AutoscalingEnabled,
    /// The pool is mid-operation
    NotSettled(ProvisioningState),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AutoscalingEnabled => write!(f, "autoscaling enabled on the agent pool"),
            SkipReason::NotSettled(state) => {
                write!(f, "agent pool provisioning state is {}", state)
            }
        }
    }
}

/// What an evaluation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingAction {
    Skipped(SkipReason),
    /// Queue inspected, pool size unchanged
    Held { queued: usize },
    ScaledUp { from: u32, to: u32, queued: usize },
    ScaledDown {
        from: u32,
        to: u32,
        queued: usize,
        drain: DrainReport,
    },
}

impl ScalingAction {
    pub fn is_scaling(&self) -> bool {
        matches!(
            self,
            ScalingAction::ScaledUp { .. } | ScalingAction::ScaledDown { .. }
        )
    }

    pub fn queued(&self) -> Option<usize> {
        match self {
            ScalingAction::Skipped(_) => None,
            ScalingAction::Held { queued }
            | ScalingAction::ScaledUp { queued, .. }
            | ScalingAction::ScaledDown { queued, .. } => Some(*queued),
        }
    }
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Event time to carry into the next evaluation
    pub last_event_time: DateTime<Utc>,
    pub action: ScalingAction,
    /// Desired pool size after this evaluation
    pub pool_count: u32,
}

/// Combines cluster and pool state into scaling actions
#[derive(Clone)]
pub struct ScalingEngine {
    cluster: Arc<dyn ClusterApi>,
    resizer: PoolResizer,
    drain: DrainController,
}

impl ScalingEngine {
    pub fn new(cluster: Arc<dyn ClusterApi>, resizer: PoolResizer, drain: DrainController) -> Self {
        Self {
            cluster,
            resizer,
            drain,
        }
    }

    /// Evaluate `pool` at time `now` and apply at most one scaling step.
    ///
    /// Returns `now` as the new event time if the pool was resized,
    /// otherwise `last_event_time` unchanged.
    pub async fn evaluate(
        &self,
        mut pool: AgentPool,
        cluster: &ManagedCluster,
        last_event_time: DateTime<Utc>,
        config: &ScalerConfig,
        now: DateTime<Utc>,
        shutdown: &mut Shutdown,
    ) -> Result<Evaluation> {
        let unchanged = |pool: &AgentPool, reason: SkipReason| Evaluation {
            last_event_time,
            action: ScalingAction::Skipped(reason),
            pool_count: pool.count(),
        };

        if pool.autoscaling_enabled() {
            debug!(pool = %pool.name, "Autoscaling is enabled on the agent pool, leaving the scaling to AKS");
            return Ok(unchanged(&pool, SkipReason::AutoscalingEnabled));
        }

        if !pool.provisioning_state().is_settled() {
            debug!(
                pool = %pool.name,
                state = %pool.provisioning_state(),
                "Agent pool is not in a state that can be scaled"
            );
            let state = pool.provisioning_state().clone();
            return Ok(unchanged(&pool, SkipReason::NotSettled(state)));
        }

        let nodes_pre_scale =
            nodes_in_pool(self.cluster.as_ref(), &config.pool_label, &pool.name).await?;
        let pre_scale_count = pool.count();
        let queued = count_workloads_in_phase(
            self.cluster.as_ref(),
            &config.default_namespace,
            config.pod_phase,
        )
        .await?;

        let elapsed = elapsed_since(last_event_time, now);
        let threshold = config.max_pod_queue as usize;
        debug!(
            pool = %pool.name,
            queued,
            threshold,
            nodes = nodes_pre_scale.len(),
            elapsed_secs = elapsed.as_secs(),
            "Evaluating agent pool"
        );

        let mut action = ScalingAction::Held { queued };
        let mut resized_to_zero = false;

        match queued.cmp(&threshold) {
            Ordering::Greater => {
                if elapsed >= config.scale_up_delay() {
                    pool.set_count(pre_scale_count.saturating_add(1));
                    debug!(
                        pool = %pool.name,
                        from = pre_scale_count,
                        to = pool.count(),
                        "Scaling up the agent pool"
                    );
                    action = ScalingAction::ScaledUp {
                        from: pre_scale_count,
                        to: pool.count(),
                        queued,
                    };
                } else {
                    debug!(pool = %pool.name, "Scale-up held back by delay");
                }
            }
            Ordering::Less => {
                let strategy = config.strategy()?;
                match strategy.select(&nodes_pre_scale) {
                    None => debug!(pool = %pool.name, "No node in pool to remove"),
                    Some(node) if elapsed >= config.scale_down_delay() => {
                        let drain = self.drain.remove_node(node, config, now, shutdown).await?;

                        if pre_scale_count > 1 {
                            pool.set_count(pre_scale_count - 1);
                        } else {
                            self.resizer
                                .scale_to_zero(&pool, cluster, &config.azure_resource_group_name)
                                .await?;
                            pool.set_count(0);
                            resized_to_zero = true;
                        }

                        debug!(
                            pool = %pool.name,
                            node = %drain.node,
                            from = pre_scale_count,
                            to = pool.count(),
                            "Scaling down the agent pool, node already deleted, syncing pool size"
                        );
                        action = ScalingAction::ScaledDown {
                            from: pre_scale_count,
                            to: pool.count(),
                            queued,
                            drain,
                        };
                    }
                    Some(node) => {
                        debug!(pool = %pool.name, node = %node, "Scale-down held back by delay")
                    }
                }
            }
            Ordering::Equal => {}
        }

        if pool.count() != pre_scale_count && !resized_to_zero {
            self.resizer.apply_pool_size(&pool, cluster, config).await?;
        }

        Ok(Evaluation {
            last_event_time: if action.is_scaling() {
                now
            } else {
                last_event_time
            },
            pool_count: pool.count(),
            action,
        })
    }
}
