//! Endpoint registry.
//!
//! Same single-owner layout as the orchestrator's execution registry: one
//! task applies commands, readers see `watch` snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::endpoint::{DiscoveredEndpoint, ProbeOutcome};
use crate::error::DiscoveryError;

const COMMAND_BUFFER: usize = 256;

pub type Snapshot = Arc<HashMap<String, DiscoveredEndpoint>>;

/// Result of registering a Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,
}

enum Command {
    Upsert {
        endpoint: Box<DiscoveredEndpoint>,
        ack: oneshot::Sender<(Upserted, DiscoveredEndpoint)>,
    },
    Remove {
        name: String,
        ack: oneshot::Sender<Option<DiscoveredEndpoint>>,
    },
    RecordProbe {
        name: String,
        outcome: ProbeOutcome,
        ack: oneshot::Sender<Option<DiscoveredEndpoint>>,
    },
    Retain {
        keep: HashSet<String>,
        ack: oneshot::Sender<Vec<String>>,
    },
}

#[derive(Clone)]
pub struct EndpointRegistry {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
}

impl EndpointRegistry {
    /// Spawn the owner task. Must be called inside a Tokio runtime.
    pub fn spawn() -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (publisher, snapshot) = watch::channel(Snapshot::default());
        tokio::spawn(run_owner(rx, publisher));
        Self { commands, snapshot }
    }

    /// Insert a new endpoint or refresh the existing one of the same name.
    pub async fn upsert(
        &self,
        endpoint: DiscoveredEndpoint,
    ) -> Result<(Upserted, DiscoveredEndpoint), DiscoveryError> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Upsert {
            endpoint: Box::new(endpoint),
            ack,
        })
        .await?;
        done.await.map_err(|_| DiscoveryError::RegistryClosed)
    }

    pub async fn remove(&self, name: &str) -> Result<Option<DiscoveredEndpoint>, DiscoveryError> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Remove {
            name: name.to_string(),
            ack,
        })
        .await?;
        done.await.map_err(|_| DiscoveryError::RegistryClosed)
    }

    /// Apply a probe result. Returns `None` when the endpoint was removed
    /// while the probe was in flight; the result is then discarded.
    pub async fn record_probe(
        &self,
        name: &str,
        outcome: ProbeOutcome,
    ) -> Result<Option<DiscoveredEndpoint>, DiscoveryError> {
        let (ack, done) = oneshot::channel();
        self.send(Command::RecordProbe {
            name: name.to_string(),
            outcome,
            ack,
        })
        .await?;
        done.await.map_err(|_| DiscoveryError::RegistryClosed)
    }

    /// Drop every endpoint not in `keep`, returning the dropped names.
    pub async fn retain(&self, keep: HashSet<String>) -> Result<Vec<String>, DiscoveryError> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Retain { keep, ack }).await?;
        done.await.map_err(|_| DiscoveryError::RegistryClosed)
    }

    pub fn get(&self, name: &str) -> Option<DiscoveredEndpoint> {
        self.snapshot.borrow().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.snapshot.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    async fn send(&self, command: Command) -> Result<(), DiscoveryError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DiscoveryError::RegistryClosed)
    }
}

async fn run_owner(mut rx: mpsc::Receiver<Command>, publisher: watch::Sender<Snapshot>) {
    let mut endpoints: HashMap<String, DiscoveredEndpoint> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Upsert { endpoint, ack } => {
                let endpoint = *endpoint;
                let (outcome, current) = match endpoints.get_mut(&endpoint.name) {
                    Some(existing) => {
                        existing.refresh_from(endpoint);
                        (Upserted::Updated, existing.clone())
                    }
                    None => {
                        let current = endpoint.clone();
                        endpoints.insert(endpoint.name.clone(), endpoint);
                        (Upserted::Created, current)
                    }
                };
                debug!(endpoint = %current.name, ?outcome, "Registered endpoint");
                publisher.send_replace(Arc::new(endpoints.clone()));
                let _ = ack.send((outcome, current));
            }
            Command::Remove { name, ack } => {
                let removed = endpoints.remove(&name);
                if removed.is_some() {
                    publisher.send_replace(Arc::new(endpoints.clone()));
                }
                let _ = ack.send(removed);
            }
            Command::RecordProbe { name, outcome, ack } => {
                let updated = endpoints.get_mut(&name).map(|endpoint| {
                    endpoint.apply_probe(outcome, Utc::now());
                    endpoint.clone()
                });
                if updated.is_some() {
                    publisher.send_replace(Arc::new(endpoints.clone()));
                }
                let _ = ack.send(updated);
            }
            Command::Retain { keep, ack } => {
                let mut dropped: Vec<String> = endpoints
                    .keys()
                    .filter(|name| !keep.contains(*name))
                    .cloned()
                    .collect();
                dropped.sort();
                for name in &dropped {
                    endpoints.remove(name);
                }
                if !dropped.is_empty() {
                    publisher.send_replace(Arc::new(endpoints.clone()));
                }
                let _ = ack.send(dropped);
            }
        }
    }

    debug!("Endpoint registry owner stopped");
}
