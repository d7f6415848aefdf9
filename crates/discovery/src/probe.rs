//! HTTP health probes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::Instant;
use tracing::debug;

use crate::endpoint::ProbeOutcome;
use crate::error::ProbeError;

/// Default timeout for one probe request.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Paths tried in order; the first 2xx answer marks the endpoint healthy.
pub const PROBE_PATHS: [&str; 2] = ["/health", "/v1/models"];

#[async_trait]
pub trait EndpointProber: Send + Sync {
    async fn probe(&self, base_url: &str) -> ProbeOutcome;
}

pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn check(&self, url: &str) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ProbeError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl EndpointProber for HttpProber {
    async fn probe(&self, base_url: &str) -> ProbeOutcome {
        let base = base_url.trim_end_matches('/');
        let start = Instant::now();
        let mut last_error = None;

        for path in PROBE_PATHS {
            let url = format!("{base}{path}");
            match self.check(&url).await {
                Ok(()) => {
                    return ProbeOutcome {
                        healthy: true,
                        latency: start.elapsed(),
                        message: None,
                    };
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Probe path failed");
                    last_error = Some(e);
                }
            }
        }

        ProbeOutcome {
            healthy: false,
            latency: start.elapsed(),
            message: last_error.map(|e| e.to_string()),
        }
    }
}
