//! Error types for the discovery agent.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The Service exposes no ports, so no URL can be derived.
    #[error("service {0} exposes no ports")]
    NoPorts(String),

    /// The Service object lacks a name or namespace.
    #[error("service is missing {0}")]
    MissingMetadata(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("endpoint registry is closed")]
    RegistryClosed,
}

/// Failures talking to the declarative store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(String),

    /// Optimistic concurrency kept failing.
    #[error("record {name} still conflicted after {attempts} attempts")]
    Conflict { name: String, attempts: u32 },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a health probe failed. Never fatal; the endpoint is marked unhealthy.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },
}
