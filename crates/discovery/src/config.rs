//! Discovery agent configuration loaded from a mounted YAML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::DiscoverySettings;
use crate::endpoint::DEFAULT_ERROR_WINDOW;
use crate::probe::DEFAULT_PROBE_TIMEOUT_SECS;
use crate::store::DEFAULT_MAX_RETRIES;
use crate::watcher::WatchBackoff;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Services matching this selector are treated as LLM endpoints.
    #[serde(default = "default_label_selector")]
    pub label_selector: String,

    #[serde(default = "default_type_label")]
    pub type_label: String,

    #[serde(default = "default_type")]
    pub default_type: String,

    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Number of recent probes the error rate covers.
    #[serde(default = "default_error_window")]
    pub error_window: usize,

    #[serde(default = "default_max_status_retries")]
    pub max_status_retries: u32,

    #[serde(default = "default_watch_backoff_initial_secs")]
    pub watch_backoff_initial_secs: u64,

    #[serde(default = "default_watch_backoff_max_secs")]
    pub watch_backoff_max_secs: u64,

    /// Tries at deleting the record of a removed Service.
    #[serde(default = "default_delete_attempts")]
    pub delete_attempts: u32,

    #[serde(default = "default_delete_retry_delay_ms")]
    pub delete_retry_delay_ms: u64,
}

fn default_label_selector() -> String {
    "llm-provider=true".to_string()
}

fn default_type_label() -> String {
    "llm-type".to_string()
}

fn default_type() -> String {
    "custom".to_string()
}

fn default_provider() -> String {
    "self-hosted".to_string()
}

fn default_priority() -> i32 {
    50
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_error_window() -> usize {
    DEFAULT_ERROR_WINDOW
}

fn default_max_status_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_watch_backoff_initial_secs() -> u64 {
    1
}

fn default_watch_backoff_max_secs() -> u64 {
    30
}

fn default_delete_attempts() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_delete_retry_delay_ms() -> u64 {
    500
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            label_selector: default_label_selector(),
            type_label: default_type_label(),
            default_type: default_type(),
            provider: default_provider(),
            priority: default_priority(),
            sweep_interval_secs: default_sweep_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            error_window: default_error_window(),
            max_status_retries: default_max_status_retries(),
            watch_backoff_initial_secs: default_watch_backoff_initial_secs(),
            watch_backoff_max_secs: default_watch_backoff_max_secs(),
            delete_attempts: default_delete_attempts(),
            delete_retry_delay_ms: default_delete_retry_delay_ms(),
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from a mounted YAML file.
    pub fn from_mounted_file(config_path: &str) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;

        let config: DiscoveryConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;
        Ok(config)
    }

    pub fn load(path: Option<&str>) -> Self {
        let Some(path) = path.filter(|p| Path::new(p).exists()) else {
            info!("No discovery config file found, using defaults");
            return Self::default();
        };

        match Self::from_mounted_file(path) {
            Ok(cfg) => {
                info!("Loaded discovery configuration from {}", path);
                cfg
            }
            Err(err) => {
                warn!("Failed to load configuration from {}: {}. Using defaults.", path, err);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.label_selector.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "label_selector must not be empty; it would select every Service"
            ));
        }
        if self.type_label.is_empty() || self.default_type.is_empty() {
            return Err(anyhow::anyhow!("type_label and default_type must not be empty"));
        }
        if self.sweep_interval_secs == 0 || self.probe_timeout_secs == 0 {
            return Err(anyhow::anyhow!("sweep and probe intervals must be greater than zero"));
        }
        if self.error_window == 0 || self.max_status_retries == 0 || self.delete_attempts == 0 {
            return Err(anyhow::anyhow!(
                "error_window, max_status_retries and delete_attempts must be positive"
            ));
        }
        if self.watch_backoff_initial_secs == 0
            || self.watch_backoff_max_secs < self.watch_backoff_initial_secs
        {
            return Err(anyhow::anyhow!(
                "watch_backoff_max_secs must be at least watch_backoff_initial_secs, which must be positive"
            ));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            type_label: self.type_label.clone(),
            default_type: self.default_type.clone(),
            provider: self.provider.clone(),
            priority: self.priority,
            error_window: self.error_window,
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            delete_attempts: self.delete_attempts,
            delete_retry_delay: Duration::from_millis(self.delete_retry_delay_ms),
        }
    }

    pub fn watch_backoff(&self) -> WatchBackoff {
        WatchBackoff {
            initial: Duration::from_secs(self.watch_backoff_initial_secs),
            max: Duration::from_secs(self.watch_backoff_max_secs),
        }
    }
}
