//! Discovery agent for self-hosted LLM endpoints.
//!
//! Watches Services carrying the discovery label across all namespaces,
//! keeps an in-memory [`EndpointRegistry`] of them, probes each one over
//! HTTP and projects the result into cluster-scoped [`LLMEndpoint`]
//! resources that the routing layer reads.
//!
//! Kubernetes sits behind [`EndpointStore`] and HTTP behind
//! [`EndpointProber`], so the agent runs unchanged against
//! [`MemoryEndpointStore`] in tests.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod agent;
pub mod config;
pub mod crd;
pub mod endpoint;
pub mod error;
pub mod probe;
pub mod registry;
pub mod store;
pub mod watcher;

pub use agent::{DiscoveryAgent, DiscoverySettings};
pub use config::DiscoveryConfig;
pub use crd::{EndpointPhase, HealthStatus, LLMEndpoint, LLMEndpointSpec, LLMEndpointStatus};
pub use endpoint::{DiscoveredEndpoint, ErrorWindow, Health, ProbeOutcome, ServiceInfo};
pub use error::{DiscoveryError, ProbeError, StoreError};
pub use probe::{EndpointProber, HttpProber};
pub use registry::{EndpointRegistry, Snapshot, Upserted};
pub use store::{EndpointStore, KubeEndpointStore, MemoryEndpointStore};
pub use watcher::{run_watch, ServiceEvent, WatchBackoff};
