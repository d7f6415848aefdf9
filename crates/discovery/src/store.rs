//! Declarative store for `LLMEndpoint` records.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::crd::{LLMEndpoint, LLMEndpointStatus, MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::error::StoreError;

/// Default number of attempts for a conflicting write.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// Create the record, or replace its spec and add its labels if it
    /// already exists.
    async fn apply(&self, record: &LLMEndpoint) -> Result<(), StoreError>;

    /// Delete the record. A missing record is not an error.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    async fn update_status(&self, name: &str, status: &LLMEndpointStatus) -> Result<(), StoreError>;

    /// Names of all records this agent manages.
    async fn managed_names(&self) -> Result<Vec<String>, StoreError>;
}

/// Store backed by the Kubernetes API.
pub struct KubeEndpointStore {
    api: Api<LLMEndpoint>,
    max_retries: u32,
}

impl KubeEndpointStore {
    pub fn new(client: Client, max_retries: u32) -> Self {
        Self::with_api(Api::all(client), max_retries)
    }

    pub fn with_api(api: Api<LLMEndpoint>, max_retries: u32) -> Self {
        Self {
            api,
            max_retries: max_retries.max(1),
        }
    }

    fn conflict(&self, name: &str) -> StoreError {
        StoreError::Conflict {
            name: name.to_string(),
            attempts: self.max_retries,
        }
    }
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}

/// Whether `existing` already carries every label of `record`.
fn has_labels(existing: &LLMEndpoint, record: &LLMEndpoint) -> bool {
    record.metadata.labels.iter().flatten().all(|(key, value)| {
        existing
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            == Some(value)
    })
}

/// Copy the record's spec and labels onto `existing`, keeping labels set by
/// others.
fn merge_into(existing: &mut LLMEndpoint, record: &LLMEndpoint) {
    existing.spec = record.spec.clone();
    if let Some(labels) = &record.metadata.labels {
        existing
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());
    }
}

#[async_trait]
impl EndpointStore for KubeEndpointStore {
    async fn apply(&self, record: &LLMEndpoint) -> Result<(), StoreError> {
        let name = record.metadata.name.clone().unwrap_or_default();

        match self.api.create(&PostParams::default(), record).await {
            Ok(_) => {
                info!(endpoint = %name, url = %record.spec.url, "Created LLMEndpoint");
                return Ok(());
            }
            Err(e) if is_status(&e, 409) => {
                debug!(endpoint = %name, "LLMEndpoint exists, replacing spec");
            }
            Err(e) => return Err(e.into()),
        }

        for attempt in 1..=self.max_retries {
            let mut updated = self.api.get(&name).await?;
            if updated.spec == record.spec && has_labels(&updated, record) {
                return Ok(());
            }

            merge_into(&mut updated, record);
            match self.api.replace(&name, &PostParams::default(), &updated).await {
                Ok(_) => {
                    info!(endpoint = %name, "Updated LLMEndpoint");
                    return Ok(());
                }
                Err(e) if is_status(&e, 409) => {
                    warn!(endpoint = %name, attempt, "Conflict replacing LLMEndpoint, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(self.conflict(&name))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(endpoint = %name, "Deleted LLMEndpoint");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => {
                debug!(endpoint = %name, "LLMEndpoint already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(&self, name: &str, status: &LLMEndpointStatus) -> Result<(), StoreError> {
        for attempt in 1..=self.max_retries {
            let existing = match self.api.get_status(name).await {
                Ok(existing) => existing,
                Err(e) if is_status(&e, 404) => return Err(StoreError::NotFound(name.to_string())),
                Err(e) => return Err(e.into()),
            };

            // Carrying resourceVersion makes the patch fail with 409 if the
            // record changed since the read.
            let patch = json!({
                "metadata": { "resourceVersion": existing.metadata.resource_version },
                "status": status,
            });
            match self
                .api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                Ok(_) => {
                    debug!(endpoint = %name, phase = %status.phase, "Updated LLMEndpoint status");
                    return Ok(());
                }
                Err(e) if is_status(&e, 409) => {
                    warn!(endpoint = %name, attempt, "Conflict updating LLMEndpoint status, retrying");
                }
                Err(e) if is_status(&e, 404) => return Err(StoreError::NotFound(name.to_string())),
                Err(e) => return Err(e.into()),
            }
        }
        Err(self.conflict(name))
    }

    async fn managed_names(&self) -> Result<Vec<String>, StoreError> {
        let params = ListParams::default().labels(&format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}"));
        let records = self.api.list(&params).await?;
        Ok(records
            .items
            .into_iter()
            .filter_map(|record| record.metadata.name)
            .collect())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryEndpointStore {
    records: Mutex<BTreeMap<String, LLMEndpoint>>,
}

impl MemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<LLMEndpoint> {
        self.records.lock().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.records.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Seed a record as if an earlier agent run had created it.
    pub async fn insert(&self, record: LLMEndpoint) {
        let name = record.metadata.name.clone().unwrap_or_default();
        self.records.lock().await.insert(name, record);
    }
}

#[async_trait]
impl EndpointStore for MemoryEndpointStore {
    async fn apply(&self, record: &LLMEndpoint) -> Result<(), StoreError> {
        let name = record.metadata.name.clone().unwrap_or_default();
        let mut records = self.records.lock().await;
        match records.get_mut(&name) {
            Some(existing) => merge_into(existing, record),
            None => {
                records.insert(name, record.clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.records.lock().await.remove(name);
        Ok(())
    }

    async fn update_status(&self, name: &str, status: &LLMEndpointStatus) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        record.status = Some(status.clone());
        Ok(())
    }

    async fn managed_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|(_, record)| {
                record
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(MANAGED_BY_LABEL))
                    .is_some_and(|v| v == MANAGED_BY_VALUE)
            })
            .map(|(name, _)| name.clone())
            .collect())
    }
}
