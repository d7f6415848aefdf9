//! Operation classes served by background agents.

mod cost;
mod deployment;
mod training;

pub use cost::{CostHandler, CostMonitor, COST_CHANNEL, COST_NOTIFICATION_CHANNEL};
pub use deployment::{DeploymentHandler, DEPLOYMENT_CHANNEL};
pub use training::{TrainingHandler, TRAINING_CHANNEL};
