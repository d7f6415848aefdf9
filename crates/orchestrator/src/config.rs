//! Orchestrator configuration loaded from a mounted YAML file.

use std::path::Path;
use std::time::Duration;

use gateway::TrainingPoll;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::step::WorkflowSettings;

/// Main orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base URL of the tool gateway.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    /// Upper bound on a single HTTP request to the API.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Step behaviour shared by every workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Wait before declaring a fresh deployment healthy.
    #[serde(default = "default_stabilization_delay_secs")]
    pub stabilization_delay_secs: u64,

    #[serde(default = "default_training_poll_interval_secs")]
    pub training_poll_interval_secs: u64,

    #[serde(default = "default_training_timeout_secs")]
    pub training_timeout_secs: u64,

    #[serde(default = "default_vgpu")]
    pub default_vgpu: f64,

    #[serde(default = "default_pool")]
    pub default_pool: String,

    #[serde(default = "default_allocation_duration")]
    pub allocation_duration: String,

    /// Finished requests kept in memory; the oldest are forgotten first.
    #[serde(default = "default_max_finished_requests")]
    pub max_finished_requests: usize,
}

fn default_listen_addr() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_gateway_url() -> String {
    "http://tool-gateway:8080".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    gateway::client::DEFAULT_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_stabilization_delay_secs() -> u64 {
    5
}

fn default_training_poll_interval_secs() -> u64 {
    gateway::training::DEFAULT_POLL_INTERVAL_SECS
}

fn default_training_timeout_secs() -> u64 {
    gateway::training::DEFAULT_TRAINING_TIMEOUT_SECS
}

fn default_vgpu() -> f64 {
    1.0
}

fn default_pool() -> String {
    "default-pool".to_string()
}

fn default_allocation_duration() -> String {
    "24h".to_string()
}

fn default_max_finished_requests() -> usize {
    crate::registry::DEFAULT_MAX_FINISHED
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            stabilization_delay_secs: default_stabilization_delay_secs(),
            training_poll_interval_secs: default_training_poll_interval_secs(),
            training_timeout_secs: default_training_timeout_secs(),
            default_vgpu: default_vgpu(),
            default_pool: default_pool(),
            allocation_duration: default_allocation_duration(),
            max_finished_requests: default_max_finished_requests(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            gateway_url: default_gateway_url(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a mounted YAML file.
    pub fn from_mounted_file(config_path: &str) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;

        let config: OrchestratorConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;
        Ok(config)
    }

    /// Load from `path` if it exists, falling back to defaults.
    pub fn load(path: Option<&str>) -> Self {
        let Some(path) = path.filter(|p| Path::new(p).exists()) else {
            info!("No orchestrator config file found, using defaults");
            return Self::default();
        };

        match Self::from_mounted_file(path) {
            Ok(cfg) => {
                info!("Loaded orchestrator configuration from {}", path);
                cfg
            }
            Err(err) => {
                warn!("Failed to load configuration from {}: {}. Using defaults.", path, err);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.gateway_url.is_empty() {
            return Err(anyhow::anyhow!("gateway_url must not be empty"));
        }
        if self.gateway_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("timeouts must be greater than zero"));
        }
        if self.workflow.training_poll_interval_secs == 0 {
            return Err(anyhow::anyhow!("training_poll_interval_secs must be greater than zero"));
        }
        if self.workflow.training_timeout_secs < self.workflow.training_poll_interval_secs {
            return Err(anyhow::anyhow!(
                "training_timeout_secs must be at least training_poll_interval_secs"
            ));
        }
        if self.workflow.default_vgpu <= 0.0 {
            return Err(anyhow::anyhow!("default_vgpu must be positive"));
        }
        if self.workflow.max_finished_requests == 0 {
            return Err(anyhow::anyhow!("max_finished_requests must be greater than zero"));
        }
        Ok(())
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        let workflow = &self.workflow;
        WorkflowSettings {
            stabilization_delay: Duration::from_secs(workflow.stabilization_delay_secs),
            training_poll: TrainingPoll {
                interval: Duration::from_secs(workflow.training_poll_interval_secs),
                timeout: Duration::from_secs(workflow.training_timeout_secs),
            },
            default_vgpu: workflow.default_vgpu,
            default_pool: workflow.default_pool.clone(),
            allocation_duration: workflow.allocation_duration.clone(),
            max_finished_requests: workflow.max_finished_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_workflow_defaults() {
        let yaml = "gateway_url: http://localhost:8080\nworkflow:\n  stabilization_delay_secs: 0\n";
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.workflow.stabilization_delay_secs, 0);
        assert_eq!(config.workflow.training_timeout_secs, 1800);
        assert!(config.validate().is_ok());

        let settings = config.workflow_settings();
        assert!(settings.stabilization_delay.is_zero());
        assert_eq!(settings.training_poll.interval, Duration::from_secs(5));
        assert_eq!(settings.default_pool, "default-pool");
        assert_eq!(settings.max_finished_requests, 1000);
    }

    #[test]
    fn test_validate_rejects_timeout_below_interval() {
        let mut config = OrchestratorConfig::default();
        config.workflow.training_poll_interval_secs = 10;
        config.workflow.training_timeout_secs = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nonpositive_vgpu() {
        let mut config = OrchestratorConfig::default();
        config.workflow.default_vgpu = 0.0;
        assert!(config.validate().is_err());
    }
}
