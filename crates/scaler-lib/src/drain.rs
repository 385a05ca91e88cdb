//! Node drain protocol
//!
//! Removing a node walks `Selected -> Cordoned -> Draining -> Removed`:
//! the node is cordoned, then polled until its running non-daemon pods are
//! gone or the drain timeout elapses, then deleted either way. The pool
//! count is not touched here.

use crate::clock::{elapsed_since, Clock, Shutdown};
use crate::cluster::{workloads_on_node, ClusterApi};
use crate::config::ScalerConfig;
use crate::error::{Result, ScalerError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interval between drain polls
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Progress of a single node removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Selected,
    Cordoned,
    Draining,
    Removed,
}

/// Outcome of a completed node removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub node: String,
    /// True if the node was deleted with pods still running
    pub forced: bool,
    /// Pods still present when the wait ended
    pub remaining: Vec<String>,
    /// Time from the start of the tick to the end of the wait
    pub waited: Duration,
    pub polls: u32,
}

/// Cordons, drains and deletes nodes
#[derive(Clone)]
pub struct DrainController {
    cluster: Arc<dyn ClusterApi>,
    clock: Arc<dyn Clock>,
}

impl DrainController {
    pub fn new(cluster: Arc<dyn ClusterApi>, clock: Arc<dyn Clock>) -> Self {
        Self { cluster, clock }
    }

    /// Remove `node`, measuring the drain timeout from `started_at`.
    ///
    /// A cordon or delete failure is returned as-is. A shutdown request
    /// during the wait returns [`ScalerError::Cancelled`] and leaves the node
    /// cordoned.
    pub async fn remove_node(
        &self,
        node: &str,
        config: &ScalerConfig,
        started_at: DateTime<Utc>,
        shutdown: &mut Shutdown,
    ) -> Result<DrainReport> {
        let timeout = config.drain_timeout();
        let mut state = DrainState::Selected;
        debug!(node = %node, state = ?state, "Node selected for removal");

        self.cluster.cordon_node(node).await?;
        state = DrainState::Cordoned;
        info!(node = %node, state = ?state, "Cordoned node, waiting for running pods to finish");

        state = DrainState::Draining;
        let mut polls = 0u32;
        let (remaining, waited) = loop {
            if shutdown.is_requested() {
                warn!(node = %node, "Shutdown requested while draining, node left cordoned");
                return Err(ScalerError::Cancelled);
            }

            let remaining =
                workloads_on_node(self.cluster.as_ref(), &config.drain_namespace, node).await?;
            polls += 1;
            let waited = elapsed_since(started_at, self.clock.now());

            if remaining.is_empty() || waited >= timeout {
                break (remaining, waited);
            }

            info!(
                node = %node,
                state = ?state,
                pods = ?remaining,
                waited_secs = waited.as_secs(),
                "Waiting for pods to be evicted"
            );

            tokio::select! {
                _ = self.clock.sleep(DRAIN_POLL_INTERVAL) => {}
                _ = shutdown.wait() => {
                    warn!(node = %node, "Shutdown requested while draining, node left cordoned");
                    return Err(ScalerError::Cancelled);
                }
            }
        };

        let forced = !remaining.is_empty();
        if forced {
            warn!(
                node = %node,
                pods = ?remaining,
                timeout_secs = timeout.as_secs(),
                "Drain timeout reached, deleting node anyway"
            );
        }

        self.cluster.delete_node(node).await?;
        state = DrainState::Removed;
        info!(node = %node, state = ?state, forced, "Node deleted");

        Ok(DrainReport {
            node: node.to_string(),
            forced,
            remaining,
            waited,
            polls,
        })
    }
}
