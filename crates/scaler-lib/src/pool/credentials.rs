//! Access tokens for Azure Resource Manager

use super::az_cli::AzCli;
use crate::error::{Result, ScalerError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Lifetime assumed when the CLI does not report one
const DEFAULT_LIFETIME_SECS: i64 = 10 * 60;

/// Supplies bearer tokens for management-plane calls
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// Fixed token, e.g. from `AZURE_ACCESS_TOKEN`
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct CliToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    /// Unix timestamp; only reported by recent CLI versions
    #[serde(default)]
    expires_on: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Tokens obtained from `az account get-access-token`, cached until close
/// to expiry
pub struct AzCliTokenSource {
    cli: AzCli,
    /// Token audience, derived from the management endpoint
    resource: String,
    cached: Mutex<Option<CachedToken>>,
}

impl AzCliTokenSource {
    /// Issue tokens for the management endpoint at `arm_endpoint`
    pub fn new(cli: AzCli, arm_endpoint: &str) -> Self {
        Self {
            cli,
            resource: token_resource(arm_endpoint),
            cached: Mutex::new(None),
        }
    }

    fn access_token_args(&self) -> [&str; 6] {
        [
            "account",
            "get-access-token",
            "--resource",
            self.resource.as_str(),
            "--output",
            "json",
        ]
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let output = self.cli.run(&self.access_token_args()).await?;
        parse_cli_token(&output, Utc::now())
    }
}

/// The endpoint URL with exactly one trailing slash, as the CLI expects
fn token_resource(arm_endpoint: &str) -> String {
    format!("{}/", arm_endpoint.trim_end_matches('/'))
}

fn parse_cli_token(output: &[u8], now: DateTime<Utc>) -> Result<CachedToken> {
    let token: CliToken = serde_json::from_slice(output)
        .map_err(|source| ScalerError::Decode {
            what: "az access token",
            source,
        })?;

    if token.access_token.is_empty() {
        return Err(ScalerError::Credential(
            "az returned an empty access token".to_string(),
        ));
    }

    let expires_at = token
        .expires_on
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .unwrap_or_else(|| now + Duration::seconds(DEFAULT_LIFETIME_SECS));

    Ok(CachedToken {
        value: token.access_token,
        expires_at,
    })
}

#[async_trait]
impl TokenSource for AzCliTokenSource {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at - Utc::now() > Duration::seconds(REFRESH_MARGIN_SECS) {
                return Ok(token.value.clone());
            }
        }

        debug!("Refreshing management access token");
        let token = self.fetch().await.map_err(|e| match e {
            ScalerError::Command { message, .. } => ScalerError::Credential(message),
            other => other,
        })?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}
