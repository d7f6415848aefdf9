//! Polling a training job until it finishes.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::ToolInvoker;
use crate::error::InvokeError;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default upper bound on a training run.
pub const DEFAULT_TRAINING_TIMEOUT_SECS: u64 = 30 * 60;

/// Errors raised while waiting on a training job.
#[derive(Debug, Error)]
pub enum TrainingWaitError {
    /// The status call itself failed.
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// The job reported failure.
    #[error("training job {job_id} failed: {message}")]
    Failed { job_id: String, message: String },

    /// The job did not finish in time.
    #[error("training job {job_id} did not finish within {secs}s")]
    TimedOut { job_id: String, secs: u64 },

    /// The status payload could not be understood.
    #[error("malformed training status: {0}")]
    Malformed(String),

    /// The caller stopped waiting. The job itself keeps running.
    #[error("stopped waiting for training job {job_id}: cancelled")]
    Cancelled { job_id: String },
}

/// Poll cadence for [`wait_for_training`].
#[derive(Debug, Clone, Copy)]
pub struct TrainingPoll {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for TrainingPoll {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_TRAINING_TIMEOUT_SECS),
        }
    }
}

/// Poll `get_training_status` until the job completes, fails or times out.
///
/// Returns the final status payload, which carries `adapter_id` on success.
/// Firing `cancel` ends the wait at the next status call or sleep with
/// [`TrainingWaitError::Cancelled`].
pub async fn wait_for_training(
    invoker: &dyn ToolInvoker,
    job_id: &str,
    poll: &TrainingPoll,
    cancel: &CancellationToken,
) -> Result<Value, TrainingWaitError> {
    info!(job_id = %job_id, timeout_secs = poll.timeout.as_secs(), "Waiting for training job");
    let start = Instant::now();
    let cancelled = || TrainingWaitError::Cancelled {
        job_id: job_id.to_string(),
    };

    loop {
        let status = tokio::select! {
            () = cancel.cancelled() => return Err(cancelled()),
            status = invoker.invoke("get_training_status", json!({ "job_id": job_id })) => status?,
        };

        let state = status
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| TrainingWaitError::Malformed(format!("missing status in {status}")))?;

        debug!(
            job_id = %job_id,
            status = %state,
            elapsed_secs = start.elapsed().as_secs(),
            "Polling training status"
        );

        match state {
            "completed" => {
                if status.get("adapter_id").and_then(Value::as_str).is_none() {
                    return Err(TrainingWaitError::Malformed(format!(
                        "completed job {job_id} has no adapter_id"
                    )));
                }
                info!(job_id = %job_id, "Training job completed");
                return Ok(status);
            }
            "failed" => {
                let message = status
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(TrainingWaitError::Failed {
                    job_id: job_id.to_string(),
                    message,
                });
            }
            _ => {}
        }

        if start.elapsed() >= poll.timeout {
            return Err(TrainingWaitError::TimedOut {
                job_id: job_id.to_string(),
                secs: poll.timeout.as_secs(),
            });
        }

        tokio::select! {
            () = cancel.cancelled() => {
                info!(job_id = %job_id, "Stopped waiting for training job");
                return Err(cancelled());
            }
            () = tokio::time::sleep(poll.interval) => {}
        }
    }
}
