//! Live view of a discovered LLM endpoint.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Default number of probes the error rate is computed over.
pub const DEFAULT_ERROR_WINDOW: usize = 10;

/// The parts of a Kubernetes Service discovery cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub ports: Vec<i32>,
}

impl ServiceInfo {
    /// Registry and record key, `<namespace>-<name>`.
    pub fn endpoint_name(&self) -> String {
        endpoint_name(&self.namespace, &self.name)
    }
}

pub fn endpoint_name(namespace: &str, service: &str) -> String {
    format!("{namespace}-{service}")
}

/// Cluster-local URL of a Service port.
pub fn service_url(namespace: &str, service: &str, port: i32) -> String {
    format!("http://{service}.{namespace}.svc.cluster.local:{port}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Unknown,
    Healthy,
    Unhealthy,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Outcomes of the most recent probes, oldest first.
#[derive(Debug, Clone)]
pub struct ErrorWindow {
    capacity: usize,
    failures: VecDeque<bool>,
}

impl ErrorWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            failures: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, failed: bool) {
        if self.failures.len() == self.capacity {
            self.failures.pop_front();
        }
        self.failures.push_back(failed);
    }

    /// Failed share of the window; `0.0` before the first probe.
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        if self.failures.is_empty() {
            return 0.0;
        }
        let failed = self.failures.iter().filter(|f| **f).count();
        failed as f64 / self.failures.len() as f64
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn clear(&mut self) {
        self.failures.clear();
    }
}

/// What a single health probe observed.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub healthy: bool,
    pub latency: Duration,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiscoveredEndpoint {
    pub name: String,
    pub namespace: String,
    pub service: String,
    pub url: String,
    pub endpoint_type: String,
    pub health: Health,
    /// Latency of the last successful probe.
    pub latency: Option<Duration>,
    pub errors: ErrorWindow,
    pub message: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_probe: Option<DateTime<Utc>>,
}

impl DiscoveredEndpoint {
    /// Build an endpoint from a Service, using its first port.
    pub fn from_service(
        service: &ServiceInfo,
        type_label: &str,
        default_type: &str,
        error_window: usize,
    ) -> Result<Self, DiscoveryError> {
        let port = *service
            .ports
            .first()
            .ok_or_else(|| DiscoveryError::NoPorts(format!("{}/{}", service.namespace, service.name)))?;
        let endpoint_type = service
            .labels
            .get(type_label)
            .filter(|t| !t.is_empty())
            .map_or_else(|| default_type.to_string(), Clone::clone);
        let now = Utc::now();

        Ok(Self {
            name: service.endpoint_name(),
            namespace: service.namespace.clone(),
            service: service.name.clone(),
            url: service_url(&service.namespace, &service.name, port),
            endpoint_type,
            health: Health::Unknown,
            latency: None,
            errors: ErrorWindow::new(error_window),
            message: None,
            discovered_at: now,
            last_seen: now,
            last_probe: None,
        })
    }

    /// Fold a re-delivered Service into an existing entry. Probe history is
    /// kept unless the URL moved.
    pub fn refresh_from(&mut self, fresh: DiscoveredEndpoint) {
        if fresh.url != self.url {
            self.url = fresh.url;
            self.health = Health::Unknown;
            self.latency = None;
            self.message = None;
            self.errors.clear();
        }
        self.endpoint_type = fresh.endpoint_type;
        self.last_seen = fresh.last_seen;
    }

    pub fn apply_probe(&mut self, outcome: ProbeOutcome, at: DateTime<Utc>) {
        self.errors.record(!outcome.healthy);
        self.last_probe = Some(at);
        self.message = outcome.message;
        if outcome.healthy {
            self.health = Health::Healthy;
            self.latency = Some(outcome.latency);
        } else {
            self.health = Health::Unhealthy;
        }
    }

    pub fn error_rate(&self) -> f64 {
        self.errors.rate()
    }
}
