//! Scaler configuration loading
//!
//! Settings come from a JSON file, overlaid by `AKS_SCALER_*` environment
//! variables. A missing file is replaced by a template and startup fails.

use anyhow::{bail, Context, Result};
use scaler_lib::ScalerConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the config file location
pub const CONFIG_FILE_ENV: &str = "AKS_SCALER_CONFIG_FILE";

const ENV_PREFIX: &str = "AKS_SCALER";

/// Resolve the config file path from the environment or the home directory
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs_next::home_dir().context("Could not determine the home directory")?;
    Ok(home.join(".aks_scaler").join("config.json"))
}

/// Load configuration from the resolved config file and the environment
pub fn load() -> Result<ScalerConfig> {
    load_from(&config_path()?)
}

/// Load configuration from `path`, writing a template there if it is missing
pub fn load_from(path: &Path) -> Result<ScalerConfig> {
    if !path.exists() {
        write_template(path)?;
        bail!(
            "Configuration file {} did not exist; a template was written there, fill it in and restart",
            path.display()
        );
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Json))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

    let scaler_config: ScalerConfig = settings
        .try_deserialize()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    scaler_config.validate()?;

    info!(path = %path.display(), "Configuration loaded");
    Ok(scaler_config)
}

fn write_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let template = ScalerConfig::new("", "", "", "", "default");
    let body = serde_json::to_string_pretty(&template)?;
    std::fs::write(path, body)
        .with_context(|| format!("Failed to write template to {}", path.display()))?;

    warn!(path = %path.display(), "Wrote configuration template");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaler_lib::PodPhase;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::TempDir;

    /// Every load reads the process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets variables for the lifetime of the guard
    struct EnvVars(Vec<&'static str>);

    impl EnvVars {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            for (key, value) in vars {
                std::env::set_var(key, value);
            }
            Self(vars.iter().map(|(key, _)| *key).collect())
        }
    }

    impl Drop for EnvVars {
        fn drop(&mut self) {
            for key in &self.0 {
                std::env::remove_var(key);
            }
        }
    }

    const MINIMAL: &str = r#"{
        "agent_pool_name": "gpupool",
        "azure_subscription_id": "sub-1",
        "azure_resource_group_name": "rg1",
        "aks_cluster_name": "cluster1",
        "default_namespace": "jobs"
    }"#;

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_full_file() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"{
                "agent_pool_name": "gpupool",
                "azure_subscription_id": "sub-1",
                "azure_resource_group_name": "rg1",
                "aks_cluster_name": "cluster1",
                "default_namespace": "jobs",
                "max_pod_queue": 4,
                "delay_before_scale_down_secs": 600,
                "down_scaling_strategy": "oldest",
                "pod_phase": "Pending"
            }"#,
        );

        let config = load_from(&path).unwrap();
        assert_eq!(config.agent_pool_name, "gpupool");
        assert_eq!(config.max_pod_queue, 4);
        assert_eq!(config.delay_before_scale_down_secs, 600);
        assert_eq!(config.delay_before_scale_up_secs, 100);
        assert_eq!(config.down_scaling_strategy, "oldest");
        assert_eq!(config.pod_phase, PodPhase::Pending);
    }

    #[test]
    fn test_missing_file_writes_template() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let err = load_from(&path).unwrap_err();
        assert!(err.to_string().contains("template"));
        assert!(path.exists());

        // The template is complete but still fails validation
        let template: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(template["max_pod_queue"], 10);
        assert_eq!(template["down_scaling_strategy"], "latest");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn test_missing_required_key_is_rejected() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"{
                "agent_pool_name": "gpupool",
                "azure_subscription_id": "sub-1",
                "aks_cluster_name": "cluster1",
                "default_namespace": "jobs"
            }"#,
        );

        assert!(load_from(&path).is_err());
    }

    #[test]
    fn test_zero_poll_period_is_rejected() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"{
                "agent_pool_name": "gpupool",
                "azure_subscription_id": "sub-1",
                "azure_resource_group_name": "rg1",
                "aks_cluster_name": "cluster1",
                "default_namespace": "jobs",
                "periodic_check_rate_secs": 0
            }"#,
        );

        assert!(load_from(&path).is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let path = write(&dir, MINIMAL);
        let _vars = EnvVars::set(&[
            ("AKS_SCALER_MAX_POD_QUEUE", "42"),
            ("AKS_SCALER_DOWN_SCALING_STRATEGY", "oldest"),
            ("AKS_SCALER_AKS_CLUSTER_NAME", "cluster2"),
        ]);

        let config = load_from(&path).unwrap();
        assert_eq!(config.max_pod_queue, 42);
        assert_eq!(config.down_scaling_strategy, "oldest");
        assert_eq!(config.aks_cluster_name, "cluster2");
        assert_eq!(config.agent_pool_name, "gpupool");
    }

    #[test]
    fn test_config_file_variable_selects_path() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let path = write(&dir, MINIMAL);
        let _vars = EnvVars::set(&[(CONFIG_FILE_ENV, path.to_str().unwrap())]);

        assert_eq!(config_path().unwrap(), path);
        assert_eq!(load().unwrap().default_namespace, "jobs");
    }
}
