//! Publish/subscribe transport between the orchestrator side and agents.
//!
//! Delivery is fire-and-forget: a message published to a channel nobody is
//! subscribed to is lost.

mod memory;
mod nats;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use memory::InMemoryBus;
pub use nats::NatsBus;

/// Raw payloads received on one channel. The stream ends when the
/// subscription is lost.
pub type MessageStream = BoxStream<'static, Vec<u8>>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to connect to message bus: {0}")]
    Connect(String),

    #[error("failed to publish to {channel}: {reason}")]
    Publish { channel: String, reason: String },

    #[error("failed to subscribe to {channel}: {reason}")]
    Subscribe { channel: String, reason: String },
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError>;

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError>;
}
