//! Error types shared by the scaler components

use thiserror::Error;

/// Errors raised while evaluating or applying a scaling decision
#[derive(Debug, Error)]
pub enum ScalerError {
    /// Missing or invalid setting
    #[error("configuration error: {0}")]
    Config(String),

    /// Kubernetes API call failed
    #[error("cluster API error: {0}")]
    Cluster(#[from] kube::Error),

    /// Azure Resource Manager call returned a non-success status
    #[error("pool API error ({status}): {body}")]
    PoolStatus { status: u16, body: String },

    /// Azure Resource Manager call failed before a response arrived
    #[error("pool API transport error: {0}")]
    PoolTransport(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Access token could not be obtained
    #[error("credential error: {0}")]
    Credential(String),

    /// Provider CLI invocation failed
    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },

    /// Shutdown was requested while a tick was in progress
    #[error("cancelled by shutdown signal")]
    Cancelled,
}

impl ScalerError {
    pub fn config(message: impl Into<String>) -> Self {
        ScalerError::Config(message.into())
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            ScalerError::Config(_) => "config",
            ScalerError::Cluster(_) => "cluster",
            ScalerError::PoolStatus { .. } | ScalerError::PoolTransport(_) => "pool",
            ScalerError::Decode { .. } => "decode",
            ScalerError::Credential(_) => "credential",
            ScalerError::Command { .. } => "command",
            ScalerError::Cancelled => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScalerError>;
