//! Agent configuration loaded from a mounted YAML file.

use std::path::Path;
use std::time::Duration;

use gateway::TrainingPoll;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::Backoff;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    #[serde(default = "default_training_poll_interval_secs")]
    pub training_poll_interval_secs: u64,

    #[serde(default = "default_training_timeout_secs")]
    pub training_timeout_secs: u64,

    /// First delay before re-subscribing after the bus drops us.
    #[serde(default = "default_resubscribe_initial_secs")]
    pub resubscribe_initial_secs: u64,

    #[serde(default = "default_resubscribe_max_secs")]
    pub resubscribe_max_secs: u64,

    /// How long shutdown waits for in-flight requests.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    #[serde(default = "default_cost_monitor_interval_secs")]
    pub cost_monitor_interval_secs: u64,

    /// Customer whose spend the cost monitor checks.
    #[serde(default = "default_cost_customer_id")]
    pub cost_customer_id: String,

    /// Potential savings above which the monitor notifies.
    #[serde(default = "default_cost_savings_threshold")]
    pub cost_savings_threshold: f64,
}

fn default_nats_url() -> String {
    "nats://nats:4222".to_string()
}

fn default_gateway_url() -> String {
    "http://tool-gateway:8080".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    gateway::client::DEFAULT_TIMEOUT_SECS
}

fn default_training_poll_interval_secs() -> u64 {
    gateway::training::DEFAULT_POLL_INTERVAL_SECS
}

fn default_training_timeout_secs() -> u64 {
    gateway::training::DEFAULT_TRAINING_TIMEOUT_SECS
}

fn default_resubscribe_initial_secs() -> u64 {
    1
}

fn default_resubscribe_max_secs() -> u64 {
    30
}

fn default_drain_timeout_secs() -> u64 {
    crate::agent::DEFAULT_DRAIN_TIMEOUT.as_secs()
}

fn default_cost_monitor_interval_secs() -> u64 {
    3600
}

fn default_cost_customer_id() -> String {
    "default".to_string()
}

fn default_cost_savings_threshold() -> f64 {
    100.0
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            gateway_url: default_gateway_url(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            training_poll_interval_secs: default_training_poll_interval_secs(),
            training_timeout_secs: default_training_timeout_secs(),
            resubscribe_initial_secs: default_resubscribe_initial_secs(),
            resubscribe_max_secs: default_resubscribe_max_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            cost_monitor_interval_secs: default_cost_monitor_interval_secs(),
            cost_customer_id: default_cost_customer_id(),
            cost_savings_threshold: default_cost_savings_threshold(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a mounted YAML file.
    pub fn from_mounted_file(config_path: &str) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;

        let config: AgentConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;
        Ok(config)
    }

    pub fn load(path: Option<&str>) -> Self {
        let Some(path) = path.filter(|p| Path::new(p).exists()) else {
            info!("No agent config file found, using defaults");
            return Self::default();
        };

        match Self::from_mounted_file(path) {
            Ok(cfg) => {
                info!("Loaded agent configuration from {}", path);
                cfg
            }
            Err(err) => {
                warn!("Failed to load configuration from {}: {}. Using defaults.", path, err);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.nats_url.is_empty() {
            return Err(anyhow::anyhow!("nats_url must not be empty"));
        }
        if self.gateway_url.is_empty() {
            return Err(anyhow::anyhow!("gateway_url must not be empty"));
        }
        if self.gateway_timeout_secs == 0
            || self.training_poll_interval_secs == 0
            || self.cost_monitor_interval_secs == 0
        {
            return Err(anyhow::anyhow!("timeouts and intervals must be greater than zero"));
        }
        if self.resubscribe_initial_secs == 0
            || self.resubscribe_max_secs < self.resubscribe_initial_secs
        {
            return Err(anyhow::anyhow!(
                "resubscribe_max_secs must be at least resubscribe_initial_secs, which must be positive"
            ));
        }
        if self.cost_customer_id.is_empty() {
            return Err(anyhow::anyhow!("cost_customer_id must not be empty"));
        }
        Ok(())
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn training_poll(&self) -> TrainingPoll {
        TrainingPoll {
            interval: Duration::from_secs(self.training_poll_interval_secs),
            timeout: Duration::from_secs(self.training_timeout_secs),
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn cost_monitor_interval(&self) -> Duration {
        Duration::from_secs(self.cost_monitor_interval_secs)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_secs(self.resubscribe_initial_secs),
            max: Duration::from_secs(self.resubscribe_max_secs),
        }
    }
}
