//! Discovery agent: turns Service events into registry entries and
//! `LLMEndpoint` records, and keeps their health current.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::crd::{LLMEndpoint, LLMEndpointStatus};
use crate::endpoint::{DiscoveredEndpoint, ServiceInfo};
use crate::error::{DiscoveryError, StoreError};
use crate::probe::EndpointProber;
use crate::registry::{EndpointRegistry, Upserted};
use crate::store::EndpointStore;
use crate::watcher::ServiceEvent;

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Service label holding the serving stack name.
    pub type_label: String,
    pub default_type: String,
    pub provider: String,
    pub priority: i32,
    pub error_window: usize,
    pub sweep_interval: Duration,
    /// Tries at deleting a record whose Service went away.
    pub delete_attempts: u32,
    pub delete_retry_delay: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            type_label: "llm-type".to_string(),
            default_type: "custom".to_string(),
            provider: "self-hosted".to_string(),
            priority: 50,
            error_window: crate::endpoint::DEFAULT_ERROR_WINDOW,
            sweep_interval: Duration::from_secs(30),
            delete_attempts: crate::store::DEFAULT_MAX_RETRIES,
            delete_retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Clone)]
pub struct DiscoveryAgent {
    inner: Arc<Inner>,
}

struct Inner {
    registry: EndpointRegistry,
    store: Arc<dyn EndpointStore>,
    prober: Arc<dyn EndpointProber>,
    settings: DiscoverySettings,
    /// Names seen since the watch started a re-list, `None` outside one.
    relist: Mutex<Option<HashSet<String>>>,
    probes: TaskTracker,
}

impl DiscoveryAgent {
    /// Must be called inside a Tokio runtime; spawns the registry owner.
    pub fn new(
        store: Arc<dyn EndpointStore>,
        prober: Arc<dyn EndpointProber>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: EndpointRegistry::spawn(),
                store,
                prober,
                settings,
                relist: Mutex::new(None),
                probes: TaskTracker::new(),
            }),
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.inner.registry
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.inner.settings
    }

    pub async fn handle_event(&self, event: ServiceEvent) -> Result<(), DiscoveryError> {
        match event {
            ServiceEvent::Applied(service) => self.service_applied(&service).await,
            ServiceEvent::Deleted(service) => self.service_deleted(&service).await,
            ServiceEvent::RelistStarted => {
                debug!("Service re-list started");
                *self.relist_guard() = Some(HashSet::new());
                Ok(())
            }
            ServiceEvent::RelistDone => self.prune_after_relist().await,
        }
    }

    #[instrument(skip(self, service), fields(endpoint = %service.endpoint_name()))]
    async fn service_applied(&self, service: &ServiceInfo) -> Result<(), DiscoveryError> {
        self.mark_seen(service.endpoint_name());

        let settings = &self.inner.settings;
        let endpoint = DiscoveredEndpoint::from_service(
            service,
            &settings.type_label,
            &settings.default_type,
            settings.error_window,
        )?;
        let (outcome, endpoint) = self.inner.registry.upsert(endpoint).await?;
        match outcome {
            Upserted::Created => info!(url = %endpoint.url, endpoint_type = %endpoint.endpoint_type, "Discovered endpoint"),
            Upserted::Updated => debug!(url = %endpoint.url, "Refreshed endpoint"),
        }

        let record = LLMEndpoint::from_discovered(&endpoint, &settings.provider, settings.priority);
        if let Err(e) = self.inner.store.apply(&record).await {
            warn!(error = %e, "Failed to write LLMEndpoint");
        }

        self.spawn_probe(endpoint.name);
        Ok(())
    }

    /// The endpoint is forgotten only after its record is deleted; a failed
    /// delete leaves both in place.
    #[instrument(skip(self, service), fields(endpoint = %service.endpoint_name()))]
    async fn service_deleted(&self, service: &ServiceInfo) -> Result<(), DiscoveryError> {
        let name = service.endpoint_name();
        self.delete_record(&name).await?;
        if self.inner.registry.remove(&name).await?.is_some() {
            info!("Endpoint removed");
        }
        Ok(())
    }

    async fn delete_record(&self, name: &str) -> Result<(), StoreError> {
        let settings = &self.inner.settings;
        let attempts = settings.delete_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.store.delete(name).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(endpoint = %name, attempt, error = %e, "Failed to delete LLMEndpoint, retrying");
                    tokio::time::sleep(settings.delete_retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drop registry entries and records whose Service did not show up in
    /// the re-list that just finished.
    async fn prune_after_relist(&self) -> Result<(), DiscoveryError> {
        let relist = self.relist_guard().take();
        let Some(seen) = relist else {
            debug!("Re-list finished without a start marker, nothing to prune");
            return Ok(());
        };

        let dropped = self.inner.registry.retain(seen.clone()).await?;
        let stale: Vec<String> = self
            .inner
            .store
            .managed_names()
            .await?
            .into_iter()
            .filter(|name| !seen.contains(name))
            .collect();

        for name in &stale {
            if let Err(e) = self.inner.store.delete(name).await {
                warn!(endpoint = %name, error = %e, "Failed to delete stale LLMEndpoint");
            }
        }

        info!(
            live = seen.len(),
            dropped = dropped.len(),
            stale_records = stale.len(),
            "Service re-list complete"
        );
        Ok(())
    }

    fn spawn_probe(&self, name: String) {
        let agent = self.clone();
        let span = tracing::debug_span!("probe", endpoint = %name);
        self.inner.probes.spawn(
            async move {
                if let Err(e) = agent.probe_endpoint(&name).await {
                    warn!(error = %e, "Probe failed to record");
                }
            }
            .instrument(span),
        );
    }

    /// Probe one endpoint and write the outcome to the registry and its
    /// record. Returns `None` if the endpoint is gone.
    pub async fn probe_endpoint(
        &self,
        name: &str,
    ) -> Result<Option<DiscoveredEndpoint>, DiscoveryError> {
        let Some(url) = self.inner.registry.get(name).map(|ep| ep.url) else {
            return Ok(None);
        };

        let outcome = self.inner.prober.probe(&url).await;
        let Some(endpoint) = self.inner.registry.record_probe(name, outcome).await? else {
            debug!(endpoint = %name, "Endpoint removed during probe, discarding result");
            return Ok(None);
        };
        debug!(
            endpoint = %name,
            health = %endpoint.health,
            error_rate = endpoint.error_rate(),
            "Probe recorded"
        );

        let status = LLMEndpointStatus::from_endpoint(&endpoint);
        match self.inner.store.update_status(name, &status).await {
            Ok(()) => {}
            // Record removed between probe and write; the next event settles it.
            Err(StoreError::NotFound(_)) => {
                debug!(endpoint = %name, "No LLMEndpoint to update");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Some(endpoint))
    }

    /// Re-probe every known endpoint concurrently. Returns how many were
    /// probed.
    pub async fn sweep(&self) -> usize {
        let names = self.inner.registry.names();
        let results = join_all(names.iter().map(|name| self.probe_endpoint(name))).await;

        let mut probed = 0;
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(Some(_)) => probed += 1,
                Ok(None) => {}
                Err(e) => warn!(endpoint = %name, error = %e, "Sweep probe failed to record"),
            }
        }
        debug!(probed, "Health sweep complete");
        probed
    }

    /// Sweep on the configured interval until `shutdown` fires.
    pub async fn run_sweeps(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.settings.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; new endpoints are probed on
        // discovery already.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
        info!("Health sweeps stopped");
    }

    /// Wait for in-flight discovery probes.
    pub async fn shutdown(&self) {
        self.inner.probes.close();
        self.inner.probes.wait().await;
    }

    fn mark_seen(&self, name: String) {
        if let Some(seen) = self.relist_guard().as_mut() {
            seen.insert(name);
        }
    }

    fn relist_guard(&self) -> std::sync::MutexGuard<'_, Option<HashSet<String>>> {
        self.inner.relist.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
