//! Background agents for the GPU fleet platform.
//!
//! Each agent subscribes to one bus channel (`agent.training`,
//! `agent.deployment`, `agent.cost`), handles every inbound JSON message on
//! its own task by calling the tool gateway, and publishes the outcome to
//! `<channel>.response.<request_id>`. [`CostMonitor`] additionally checks
//! spend on a timer and publishes to `notifications.cost`.
//!
//! The bus is abstract ([`MessageBus`]); [`InMemoryBus`] serves tests and
//! single-process setups, [`NatsBus`] serves deployments.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod handlers;
pub mod message;

pub use agent::{AgentHandler, BackgroundAgent, Backoff, DEFAULT_DRAIN_TIMEOUT};
pub use bus::{BusError, InMemoryBus, MessageBus, MessageStream, NatsBus};
pub use config::AgentConfig;
pub use error::AgentError;
pub use handlers::{
    CostHandler, CostMonitor, DeploymentHandler, TrainingHandler, COST_CHANNEL,
    COST_NOTIFICATION_CHANNEL, DEPLOYMENT_CHANNEL, TRAINING_CHANNEL,
};
pub use message::{reply_channel, AgentMessage, AgentReply, ReplyStatus};
