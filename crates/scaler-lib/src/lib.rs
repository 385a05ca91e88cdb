//! Queue-depth autoscaler library for a managed Kubernetes agent pool
//!
//! This crate provides the core functionality for:
//! - Reading queue depth and pool membership from the cluster
//! - Reading and resizing the agent pool through the cloud API
//! - Draining and removing nodes on scale-down
//! - The scaling decision engine and its reconciliation loop
//! - Health checks and observability

pub mod clock;
pub mod cluster;
pub mod config;
pub mod drain;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pool;
pub mod reconcile;

#[cfg(test)]
mod testing;

pub use clock::{Clock, Shutdown, SystemClock};
pub use config::ScalerConfig;
pub use error::{Result, ScalerError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScalerLogger, ScalerMetrics};
pub use reconcile::{ReconcileLoop, ReconcileLoopBuilder};
