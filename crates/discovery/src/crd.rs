//! `LLMEndpoint` custom resource.
//!
//! A cluster-scoped projection of one discovered endpoint, consumed by the
//! routing layer. The agent owns the spec and writes probe results into the
//! status subresource.

use std::collections::BTreeMap;
use std::fmt;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::endpoint::{DiscoveredEndpoint, Health};

/// Label put on every record the agent manages.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "discovery-agent";

/// Capacity reported for every healthy endpoint until real load data exists.
const DEFAULT_CAPACITY: i32 = 100;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(group = "gpufleet.io", version = "v1", kind = "LLMEndpoint")]
#[kube(status = "LLMEndpointStatus")]
#[kube(printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.url"}"#)]
#[kube(printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#)]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
#[serde(rename_all = "camelCase")]
pub struct LLMEndpointSpec {
    pub name: String,
    pub url: String,
    /// Serving stack, e.g. `vllm`, `tgi` or `custom`.
    #[serde(rename = "type")]
    pub endpoint_type: String,
    pub provider: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum EndpointPhase {
    /// Seen but not yet probed.
    #[default]
    Discovered,
    Healthy,
    /// Last probe passed but recent probes failed.
    Degraded,
    Unhealthy,
}

impl EndpointPhase {
    pub fn of(endpoint: &DiscoveredEndpoint) -> Self {
        match endpoint.health {
            Health::Unknown => Self::Discovered,
            Health::Unhealthy => Self::Unhealthy,
            Health::Healthy if endpoint.error_rate() > 0.0 => Self::Degraded,
            Health::Healthy => Self::Healthy,
        }
    }
}

impl fmt::Display for EndpointPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered => write!(f, "Discovered"),
            Self::Healthy => write!(f, "Healthy"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LLMEndpointStatus {
    #[serde(default)]
    pub phase: EndpointPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<String>,
    #[serde(default)]
    pub health: HealthStatus,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub error_rate: f64,
    /// Latency of the last successful probe, e.g. `42ms`.
    pub latency: String,
    pub capacity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LLMEndpointStatus {
    pub fn from_endpoint(endpoint: &DiscoveredEndpoint) -> Self {
        let phase = EndpointPhase::of(endpoint);
        Self {
            phase,
            discovered_at: Some(endpoint.discovered_at.to_rfc3339()),
            last_health_check: endpoint.last_probe.map(|t| t.to_rfc3339()),
            health: HealthStatus {
                status: endpoint.health.to_string(),
                error_rate: endpoint.error_rate(),
                latency: endpoint
                    .latency
                    .map(|l| format!("{}ms", l.as_millis()))
                    .unwrap_or_default(),
                capacity: if phase == EndpointPhase::Unhealthy { 0 } else { DEFAULT_CAPACITY },
                message: endpoint.message.clone(),
            },
        }
    }
}

impl LLMEndpoint {
    /// Project a discovered endpoint into a record without status.
    pub fn from_discovered(endpoint: &DiscoveredEndpoint, provider: &str, priority: i32) -> Self {
        let mut record = LLMEndpoint::new(
            &endpoint.name,
            LLMEndpointSpec {
                name: endpoint.name.clone(),
                url: endpoint.url.clone(),
                endpoint_type: endpoint.endpoint_type.clone(),
                provider: provider.to_string(),
                priority,
                authentication: None,
            },
        );
        record.metadata.labels = Some(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            MANAGED_BY_VALUE.to_string(),
        )]));
        record
    }
}
