//! NATS transport.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::info;

use super::{BusError, MessageBus, MessageStream};

/// Bus backed by core NATS subjects. Channel names are used as subjects.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        info!(url = %url, "Connected to NATS");
        Ok(Self { client })
    }

    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .publish(channel.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Publish {
                channel: channel.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError> {
        let subscriber = self
            .client
            .subscribe(channel.to_string())
            .await
            .map_err(|e| BusError::Subscribe {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;
        Ok(subscriber.map(|message| message.payload.to_vec()).boxed())
    }
}
