//! Execution registry.
//!
//! A single owner task holds the request map. Writers send commands over an
//! `mpsc` channel and wait for an acknowledgement; readers look at the latest
//! immutable snapshot published on a `watch` channel and never block writers.
//!
//! Finished requests are kept for status queries up to a limit; past it the
//! oldest finished request is forgotten. Requests still running are never
//! evicted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::error::OrchestratorError;
use crate::request::{Request, RequestUpdate};

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 256;

/// Default number of finished requests kept.
pub const DEFAULT_MAX_FINISHED: usize = 1000;

pub type Snapshot = Arc<HashMap<String, Request>>;

enum Command {
    Insert {
        request: Box<Request>,
        ack: oneshot::Sender<Result<(), OrchestratorError>>,
    },
    Update {
        id: String,
        update: RequestUpdate,
        ack: oneshot::Sender<Result<(), OrchestratorError>>,
    },
}

/// Cloneable handle to the registry owner task.
#[derive(Clone)]
pub struct ExecutionRegistry {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
}

impl ExecutionRegistry {
    /// Spawn the owner task. Must be called inside a Tokio runtime.
    ///
    /// The task exits once every handle has been dropped.
    pub fn spawn() -> Self {
        Self::spawn_with_limit(DEFAULT_MAX_FINISHED)
    }

    /// Like [`spawn`](Self::spawn), keeping at most `max_finished` finished
    /// requests.
    pub fn spawn_with_limit(max_finished: usize) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (publisher, snapshot) = watch::channel(Snapshot::default());
        tokio::spawn(run_owner(rx, publisher, max_finished.max(1)));
        Self { commands, snapshot }
    }

    /// Register a new request.
    pub async fn insert(&self, request: Request) -> Result<(), OrchestratorError> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Insert {
            request: Box::new(request),
            ack,
        })
        .await?;
        done.await.map_err(|_| OrchestratorError::RegistryClosed)?
    }

    /// Apply an update. Terminal requests reject every update.
    pub async fn update(&self, id: &str, update: RequestUpdate) -> Result<(), OrchestratorError> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Update {
            id: id.to_string(),
            update,
            ack,
        })
        .await?;
        done.await.map_err(|_| OrchestratorError::RegistryClosed)?
    }

    pub fn get(&self, id: &str) -> Option<Request> {
        self.snapshot.borrow().get(id).cloned()
    }

    /// All requests, oldest first.
    pub fn list(&self) -> Vec<Request> {
        let snapshot = self.snapshot.borrow().clone();
        let mut requests: Vec<Request> = snapshot.values().cloned().collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        requests
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    async fn send(&self, command: Command) -> Result<(), OrchestratorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| OrchestratorError::RegistryClosed)
    }
}

async fn run_owner(
    mut rx: mpsc::Receiver<Command>,
    publisher: watch::Sender<Snapshot>,
    max_finished: usize,
) {
    let mut requests: HashMap<String, Request> = HashMap::new();
    // Finished request ids, oldest first.
    let mut finished: VecDeque<String> = VecDeque::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Insert { request, ack } => {
                let outcome = if requests.contains_key(&request.id) {
                    Err(OrchestratorError::AlreadyExists(request.id.clone()))
                } else {
                    debug!(request_id = %request.id, "Registered request");
                    requests.insert(request.id.clone(), *request);
                    Ok(())
                };
                publish(&publisher, &requests, outcome.is_ok());
                let _ = ack.send(outcome);
            }
            Command::Update { id, update, ack } => {
                let outcome = match requests.get_mut(&id) {
                    None => Err(OrchestratorError::NotFound(id)),
                    Some(request) if request.status.is_terminal() => {
                        warn!(request_id = %id, status = %request.status, "Ignoring update to terminal request");
                        Err(OrchestratorError::AlreadyTerminal(id))
                    }
                    Some(request) => {
                        request.apply(update);
                        if request.status.is_terminal() {
                            finished.push_back(id);
                            evict_finished(&mut requests, &mut finished, max_finished);
                        }
                        Ok(())
                    }
                };
                publish(&publisher, &requests, outcome.is_ok());
                let _ = ack.send(outcome);
            }
        }
    }

    debug!("Execution registry owner stopped");
}

fn evict_finished(
    requests: &mut HashMap<String, Request>,
    finished: &mut VecDeque<String>,
    max_finished: usize,
) {
    while finished.len() > max_finished {
        if let Some(id) = finished.pop_front() {
            requests.remove(&id);
            debug!(request_id = %id, "Evicted finished request");
        }
    }
}

fn publish(publisher: &watch::Sender<Snapshot>, requests: &HashMap<String, Request>, changed: bool) {
    if changed {
        publisher.send_replace(Arc::new(requests.clone()));
    }
}
