//! Error types for background agents.

use gateway::{InvokeError, TrainingWaitError};
use thiserror::Error;

use crate::bus::BusError;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The inbound payload could not be understood. Never replied to.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A field the handler needs was absent or empty.
    #[error("{0} is required")]
    MissingField(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Training(#[from] TrainingWaitError),

    #[error("tool returned an unexpected result: {0}")]
    UnexpectedResult(String),

    #[error(transparent)]
    Bus(#[from] BusError),
}
