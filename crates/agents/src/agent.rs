//! The background agent loop shared by every operation class.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

use crate::bus::MessageBus;
use crate::error::AgentError;
use crate::message::{reply_channel, AgentMessage, AgentReply};

/// Work performed for one inbound message.
#[async_trait]
pub trait AgentHandler: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Channel the agent listens on.
    fn channel(&self) -> &'static str;

    /// `cancel` fires when the agent shuts down. Long waits should end
    /// early on it; the reply is still published.
    async fn handle(
        &self,
        message: &AgentMessage,
        cancel: &CancellationToken,
    ) -> Result<Value, AgentError>;
}

/// Exponential backoff between subscription attempts.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

/// Default bound on waiting for in-flight requests at shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Subscribes a handler to its channel and answers every message.
pub struct BackgroundAgent<H> {
    handler: Arc<H>,
    bus: Arc<dyn MessageBus>,
    backoff: Backoff,
    drain_timeout: Duration,
    tasks: TaskTracker,
}

impl<H: AgentHandler> BackgroundAgent<H> {
    pub fn new(handler: H, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            handler: Arc::new(handler),
            bus,
            backoff: Backoff::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            tasks: TaskTracker::new(),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Serve until `shutdown` fires, then wait up to the drain timeout for
    /// in-flight handlers. Handlers see the same token and stop early.
    ///
    /// Handler failures are replied to and never end the loop. A lost
    /// subscription is re-established with exponential backoff.
    pub async fn run(&self, shutdown: CancellationToken) {
        let channel = self.handler.channel();
        let name = self.handler.name();
        let mut delay = self.backoff.initial;

        info!(agent = %name, channel = %channel, "Starting background agent");

        loop {
            let subscription = tokio::select! {
                () = shutdown.cancelled() => break,
                subscription = self.bus.subscribe(channel) => subscription,
            };

            match subscription {
                Ok(mut stream) => {
                    info!(agent = %name, channel = %channel, "Subscribed");
                    delay = self.backoff.initial;
                    loop {
                        tokio::select! {
                            () = shutdown.cancelled() => break,
                            next = stream.next() => match next {
                                Some(payload) => self.dispatch(&payload, &shutdown),
                                None => {
                                    warn!(agent = %name, channel = %channel, "Subscription ended");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => {
                    error!(agent = %name, error = %e, retry_in = ?delay, "Subscribe failed");
                }
            }

            if shutdown.is_cancelled() {
                break;
            }
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
            delay = std::cmp::min(delay * 2, self.backoff.max);
        }

        self.tasks.close();
        if !self.tasks.is_empty() {
            info!(agent = %name, in_flight = self.tasks.len(), "Waiting for in-flight requests");
        }
        if tokio::time::timeout(self.drain_timeout, self.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                agent = %name,
                abandoned = self.tasks.len(),
                timeout = ?self.drain_timeout,
                "In-flight requests did not finish in time"
            );
        }
        info!(agent = %name, "Background agent stopped");
    }

    /// Parse a payload and handle it on its own task. Malformed payloads
    /// are logged and dropped.
    fn dispatch(&self, payload: &[u8], shutdown: &CancellationToken) {
        let message = match AgentMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(agent = %self.handler.name(), error = %e, "Dropping message");
                return;
            }
        };

        let handler = Arc::clone(&self.handler);
        let bus = Arc::clone(&self.bus);
        let cancel = shutdown.child_token();
        let span = tracing::info_span!("agent_request", agent = %handler.name(), request_id = %message.request_id);
        self.tasks.spawn(
            async move {
                let reply = match handler.handle(&message, &cancel).await {
                    Ok(result) => {
                        info!("Request succeeded");
                        AgentReply::success(&message.request_id, result)
                    }
                    Err(e) => {
                        warn!(error = %e, "Request failed");
                        AgentReply::failed(&message.request_id, e.to_string())
                    }
                };
                publish_reply(bus.as_ref(), handler.channel(), &reply).await;
            }
            .instrument(span),
        );
    }
}

async fn publish_reply(bus: &dyn MessageBus, channel: &str, reply: &AgentReply) {
    let target = reply_channel(channel, &reply.request_id);
    let payload = match serde_json::to_vec(reply) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "Failed to encode reply");
            return;
        }
    };

    match bus.publish(&target, payload).await {
        Ok(()) => debug!(channel = %target, "Published reply"),
        Err(e) => error!(channel = %target, error = %e, "Failed to publish reply"),
    }
}
