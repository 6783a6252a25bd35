//! Shared test fixtures: an in-memory [`ScriptedBackend`] plus helpers for
//! waiting on projection changes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

use cadence_core::command::ExecutionCommand;
use cadence_core::projection::ExecutionState;
use cadence_core::snapshot::ExecutionSnapshot;
use cadence_core::status::ExecutionStatus;
use cadence_core::types::ExecutionId;
use cadence_monitor::api::ApiError;
use cadence_monitor::backend::{
    CreateExecutionRequest, CreatedExecution, EventStream, ExecutionBackend, StreamError,
};

/// Sending half of a scripted execution stream.
pub type FrameSender = mpsc::UnboundedSender<Result<String, StreamError>>;

/// Scripted response: a snapshot, or an HTTP status with detail text.
pub type Scripted<T> = Result<T, (u16, &'static str)>;

/// Upper bound for any wait in these tests. Generous because paused-clock
/// tests advance virtual time through it.
const WAIT_LIMIT: Duration = Duration::from_secs(600);

/// In-memory [`ExecutionBackend`] driven by per-test scripts.
#[derive(Default)]
pub struct ScriptedBackend {
    snapshots: Mutex<HashMap<ExecutionId, VecDeque<Scripted<ExecutionSnapshot>>>>,
    last_snapshot: Mutex<HashMap<ExecutionId, ExecutionSnapshot>>,
    fetches: Mutex<Vec<(ExecutionId, Instant)>>,
    fetch_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,

    launches: Mutex<VecDeque<Scripted<ExecutionId>>>,
    create_requests: Mutex<Vec<CreateExecutionRequest>>,
    hold_creation: Mutex<bool>,
    creation_gate: Notify,

    streams: Mutex<HashMap<ExecutionId, mpsc::UnboundedReceiver<Result<String, StreamError>>>>,
    stream_opens: AtomicUsize,

    commands: Mutex<Vec<(ExecutionId, ExecutionCommand)>>,
    command_rejection: Mutex<Option<(u16, &'static str)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue snapshot responses for `id`. Once the queue is empty the last
    /// successful snapshot is repeated.
    pub fn script_snapshots(&self, id: &str, responses: Vec<Scripted<ExecutionSnapshot>>) {
        self.snapshots
            .lock()
            .unwrap()
            .entry(ExecutionId::new(id))
            .or_default()
            .extend(responses);
    }

    /// Delay every snapshot response by `delay`.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.fetches.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn fetched_ids(&self) -> Vec<String> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.to_string())
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Queue the outcome of the next creation request.
    pub fn script_launch(&self, response: Scripted<&str>) {
        self.launches
            .lock()
            .unwrap()
            .push_back(response.map(ExecutionId::new));
    }

    /// Make creation requests wait until [`release_creation`](Self::release_creation).
    pub fn hold_creation(&self) {
        *self.hold_creation.lock().unwrap() = true;
    }

    pub fn release_creation(&self) {
        self.creation_gate.notify_one();
    }

    pub fn create_requests(&self) -> Vec<CreateExecutionRequest> {
        self.create_requests.lock().unwrap().clone()
    }

    /// Register the stream served for `id`; the test pushes frames through
    /// the returned sender. `is_closed()` on it reports whether the client
    /// dropped the connection.
    pub fn prepare_stream(&self, id: &str) -> FrameSender {
        let (tx, rx) = mpsc::unbounded();
        self.streams
            .lock()
            .unwrap()
            .insert(ExecutionId::new(id), rx);
        tx
    }

    pub fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }

    /// Reject every subsequent command with `status`.
    pub fn reject_commands(&self, status: u16, detail: &'static str) {
        *self.command_rejection.lock().unwrap() = Some((status, detail));
    }

    pub fn commands(&self) -> Vec<(ExecutionId, ExecutionCommand)> {
        self.commands.lock().unwrap().clone()
    }
}

fn api_error((status, detail): (u16, &'static str)) -> ApiError {
    ApiError::Api {
        status,
        detail: detail.to_string(),
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn fetch_execution(&self, id: &ExecutionId) -> Result<ExecutionSnapshot, ApiError> {
        self.fetches.lock().unwrap().push((id.clone(), Instant::now()));

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self
            .snapshots
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Ok(snapshot)) => {
                self.last_snapshot
                    .lock()
                    .unwrap()
                    .insert(id.clone(), snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(error)) => Err(api_error(error)),
            None => self
                .last_snapshot
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| api_error((404, "Execution not found"))),
        }
    }

    async fn create_execution(
        &self,
        request: &CreateExecutionRequest,
    ) -> Result<CreatedExecution, ApiError> {
        self.create_requests.lock().unwrap().push(request.clone());

        let hold = *self.hold_creation.lock().unwrap();
        if hold {
            self.creation_gate.notified().await;
        }

        let next = self.launches.lock().unwrap().pop_front();
        match next {
            Some(Ok(id)) => Ok(CreatedExecution {
                id,
                status: Some(ExecutionStatus::Pending),
            }),
            Some(Err(error)) => Err(api_error(error)),
            None => Err(api_error((500, "No launch scripted"))),
        }
    }

    async fn send_command(
        &self,
        id: &ExecutionId,
        command: ExecutionCommand,
    ) -> Result<(), ApiError> {
        self.commands.lock().unwrap().push((id.clone(), command));
        match *self.command_rejection.lock().unwrap() {
            Some(error) => Err(api_error(error)),
            None => Ok(()),
        }
    }

    async fn open_stream(&self, id: &ExecutionId) -> Result<EventStream, ApiError> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        let rx = self.streams.lock().unwrap().remove(id);
        match rx {
            Some(rx) => Ok(rx.boxed()),
            None => Err(api_error((404, "Stream not found"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn snapshot(id: &str, status: ExecutionStatus) -> Scripted<ExecutionSnapshot> {
    Ok(ExecutionSnapshot::new(id, status))
}

/// Push one JSON frame onto a scripted stream.
pub fn push(tx: &FrameSender, frame: &str) {
    tx.unbounded_send(Ok(frame.to_string()))
        .expect("stream receiver should still be open");
}

/// Wait until the projection satisfies `predicate` and return a copy.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<ExecutionState>,
    predicate: impl FnMut(&ExecutionState) -> bool,
) -> ExecutionState {
    tokio::time::timeout(WAIT_LIMIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for projection")
        .expect("projection channel closed")
        .clone()
}

/// Wait until the client has dropped the scripted stream.
pub async fn wait_closed(tx: &FrameSender) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while !tx.is_closed() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("stream was never closed by the client");
}
