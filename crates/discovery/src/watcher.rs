//! Watch loop over labelled Services.

use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::watcher::{self, Event};
use kube::Api;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::DiscoveryAgent;
use crate::endpoint::ServiceInfo;
use crate::error::DiscoveryError;

/// What the discovery agent reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    Applied(ServiceInfo),
    Deleted(ServiceInfo),
    /// The watch is re-listing; every live Service follows as `Applied`.
    RelistStarted,
    RelistDone,
}

impl TryFrom<&Service> for ServiceInfo {
    type Error = DiscoveryError;

    fn try_from(service: &Service) -> Result<Self, Self::Error> {
        let name = service
            .metadata
            .name
            .clone()
            .ok_or(DiscoveryError::MissingMetadata("name"))?;
        let namespace = service
            .metadata
            .namespace
            .clone()
            .ok_or(DiscoveryError::MissingMetadata("namespace"))?;
        let ports = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .map(|ports| ports.iter().map(|p| p.port).collect())
            .unwrap_or_default();

        Ok(Self {
            namespace,
            name,
            labels: service.metadata.labels.clone().unwrap_or_default(),
            ports,
        })
    }
}

impl ServiceEvent {
    pub fn from_watch(event: Event<Service>) -> Result<Self, DiscoveryError> {
        Ok(match event {
            Event::Init => Self::RelistStarted,
            Event::InitDone => Self::RelistDone,
            Event::Apply(service) | Event::InitApply(service) => {
                Self::Applied(ServiceInfo::try_from(&service)?)
            }
            Event::Delete(service) => Self::Deleted(ServiceInfo::try_from(&service)?),
        })
    }
}

/// Exponential backoff between failed watch polls.
#[derive(Debug, Clone, Copy)]
pub struct WatchBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for WatchBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

/// Feed Service events to `agent` until `shutdown` fires.
///
/// Watch errors are retried on the same stream, which keeps its resource
/// version and re-lists by itself when that version expires.
pub async fn run_watch(
    services: Api<Service>,
    label_selector: String,
    agent: DiscoveryAgent,
    backoff: WatchBackoff,
    shutdown: CancellationToken,
) {
    let config = watcher::Config::default().labels(&label_selector);
    let mut stream = watcher::watcher(services.clone(), config.clone()).boxed();
    let mut delay = backoff.initial;

    info!(selector = %label_selector, "Watching Services");

    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                delay = backoff.initial;
                let event = match ServiceEvent::from_watch(event) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Ignoring Service event");
                        continue;
                    }
                };
                if let Err(e) = agent.handle_event(event).await {
                    warn!(error = %e, "Failed to handle Service event");
                }
            }
            Some(Err(e)) => {
                error!(error = %e, retry_in = ?delay, "Service watch failed");
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                delay = std::cmp::min(delay * 2, backoff.max);
            }
            None => {
                debug!("Service watch stream ended, restarting");
                stream = watcher::watcher(services.clone(), config.clone()).boxed();
            }
        }
    }

    info!("Service watch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn service(ports: &[i32]) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("svc1".to_string()),
                namespace: Some("ml".to_string()),
                labels: Some(BTreeMap::from([
                    ("llm-provider".to_string(), "true".to_string()),
                    ("llm-type".to_string(), "vllm".to_string()),
                ])),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(
                    ports
                        .iter()
                        .map(|port| ServicePort {
                            port: *port,
                            ..ServicePort::default()
                        })
                        .collect(),
                ),
                ..ServiceSpec::default()
            }),
            status: None,
        }
    }

    #[test]
    fn test_service_info_from_service() {
        let info = ServiceInfo::try_from(&service(&[8000, 8001])).unwrap();
        assert_eq!(info.endpoint_name(), "ml-svc1");
        assert_eq!(info.ports, [8000, 8001]);
        assert_eq!(info.labels.get("llm-type").map(String::as_str), Some("vllm"));
    }

    #[test]
    fn test_service_without_namespace_is_rejected() {
        let mut svc = service(&[80]);
        svc.metadata.namespace = None;
        let err = ServiceInfo::try_from(&svc).unwrap_err();
        assert_eq!(err.to_string(), "service is missing namespace");
    }

    #[test]
    fn test_watch_events_map_to_service_events() {
        assert_eq!(
            ServiceEvent::from_watch(Event::Init).unwrap(),
            ServiceEvent::RelistStarted
        );
        assert_eq!(
            ServiceEvent::from_watch(Event::InitDone).unwrap(),
            ServiceEvent::RelistDone
        );
        assert!(matches!(
            ServiceEvent::from_watch(Event::InitApply(service(&[80]))).unwrap(),
            ServiceEvent::Applied(info) if info.name == "svc1"
        ));
        assert!(matches!(
            ServiceEvent::from_watch(Event::Delete(service(&[80]))).unwrap(),
            ServiceEvent::Deleted(_)
        ));
    }
}
