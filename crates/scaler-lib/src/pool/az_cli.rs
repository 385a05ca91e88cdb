//! Azure CLI invocations

use super::ScaleToZero;
use crate::error::{Result, ScalerError};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

/// Thin wrapper around the `az` executable
#[derive(Debug, Clone)]
pub struct AzCli {
    program: String,
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new("az")
    }
}

impl AzCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `az` with `args` and return stdout, failing on a non-zero exit
    pub async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        debug!(command = %command_line, "Running az");

        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScalerError::Command {
                command: command_line.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScalerError::Command {
                command: command_line,
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(output.stdout)
    }
}

/// Scales a node pool to zero with `az aks nodepool scale --no-wait`
#[derive(Debug, Clone, Default)]
pub struct AzCliScaleToZero {
    cli: AzCli,
}

impl AzCliScaleToZero {
    pub fn new(cli: AzCli) -> Self {
        Self { cli }
    }
}

fn scale_to_zero_args<'a>(
    resource_group: &'a str,
    cluster_name: &'a str,
    pool_name: &'a str,
) -> Vec<&'a str> {
    vec![
        "aks",
        "nodepool",
        "scale",
        "--resource-group",
        resource_group,
        "--cluster-name",
        cluster_name,
        "--name",
        pool_name,
        "--node-count",
        "0",
        "--no-wait",
    ]
}

#[async_trait]
impl ScaleToZero for AzCliScaleToZero {
    async fn scale_to_zero(
        &self,
        resource_group: &str,
        cluster_name: &str,
        pool_name: &str,
    ) -> Result<()> {
        let args = scale_to_zero_args(resource_group, cluster_name, pool_name);
        self.cli.run(&args).await?;
        info!(pool = %pool_name, cluster = %cluster_name, "Scale to zero submitted");
        Ok(())
    }
}
