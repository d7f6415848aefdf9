//! Gateway configuration loaded from a mounted YAML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::platform::{PlatformSettings, DEFAULT_MAX_RECORDS, DEFAULT_TRAINING_DURATION_SECS};
use crate::registry::DEFAULT_SERVER;

/// Main gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server used for methods without a `<server>.` prefix.
    #[serde(default = "default_server")]
    pub default_server: String,

    /// Upper bound on a single HTTP request, tool execution included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Simulated training backend.
    #[serde(default)]
    pub training: TrainingConfig,

    /// Bound on each kind of record the simulated backend keeps.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Seconds a simulated training job reports `running`.
    #[serde(default = "default_simulated_duration_secs")]
    pub simulated_duration_secs: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            simulated_duration_secs: default_simulated_duration_secs(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_server() -> String {
    DEFAULT_SERVER.to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_simulated_duration_secs() -> u64 {
    DEFAULT_TRAINING_DURATION_SECS
}

fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            default_server: default_server(),
            request_timeout_secs: default_request_timeout_secs(),
            training: TrainingConfig::default(),
            max_records: default_max_records(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a mounted YAML file.
    pub fn from_mounted_file(config_path: &str) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;

        let config: GatewayConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;
        Ok(config)
    }

    /// Load from `path` if it exists, falling back to defaults.
    pub fn load(path: Option<&str>) -> Self {
        let Some(path) = path.filter(|p| Path::new(p).exists()) else {
            info!("No gateway config file found, using defaults");
            return Self::default();
        };

        match Self::from_mounted_file(path) {
            Ok(cfg) => {
                info!("Loaded gateway configuration from {}", path);
                cfg
            }
            Err(err) => {
                warn!("Failed to load configuration from {}: {}. Using defaults.", path, err);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.default_server.is_empty() {
            return Err(anyhow::anyhow!("default_server must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("request_timeout_secs must be greater than zero"));
        }
        if self.max_records == 0 {
            return Err(anyhow::anyhow!("max_records must be greater than zero"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn platform_settings(&self) -> PlatformSettings {
        PlatformSettings {
            training_duration: Duration::from_secs(self.training.simulated_duration_secs),
            max_records: self.max_records,
        }
    }
}
