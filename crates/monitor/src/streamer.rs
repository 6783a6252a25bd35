//! Streaming driver: create an execution and follow its event stream.
//!
//! Client-local lifecycle:
//!
//! ```text
//! idle --launch()--> launching --created--> running
//! launching --creation fails--> failed
//! running --progress/node_complete--> running
//! running --error--> failed          (connection closed)
//! running --complete--> completed    (connection closed)
//! running --done--> running          (connection closed)
//! running --cancel()--> idle         (connection closed, projection reset)
//! ```
//!
//! The driver holds at most one connection. The connection lives inside a
//! background task guarded by an [`ActiveTask`]; replacing or dropping the
//! guard closes it, so there is no code path that can leak it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use cadence_core::events::ProgressEvent;
use cadence_core::projection::{ExecutionState, CONNECTION_LOST_MESSAGE};
use cadence_core::types::ExecutionId;
use cadence_core::update::{ExecutionUpdate, Flow};

use crate::api::ApiError;
use crate::backend::{CreateExecutionRequest, ExecutionBackend, StreamError};
use crate::config::MonitorConfig;
use crate::session::{ActiveTask, ConnectionHandle, Session};
use crate::stream::{decode_frame, next_frame};

/// Launches executions and mirrors their streamed progress.
pub struct StreamingDriver {
    backend: Arc<dyn ExecutionBackend>,
    session: Arc<Session>,
    active: Mutex<Option<ActiveTask>>,
    idle_timeout: Option<Duration>,
}

/// Errors returned by [`StreamingDriver::launch`].
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The engine refused or never answered the creation request.
    #[error("Failed to create execution: {0}")]
    Create(#[source] ApiError),

    /// `cancel()` or another `launch()` ran while creation was in flight.
    /// The execution exists remotely but is not being followed.
    #[error("Launch of execution {0} was superseded before its stream opened")]
    Superseded(ExecutionId),
}

impl StreamingDriver {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            backend,
            session: Arc::new(Session::new()),
            active: Mutex::new(None),
            idle_timeout: None,
        }
    }

    /// Driver with the idle watchdog taken from `config`.
    pub fn from_config(backend: Arc<dyn ExecutionBackend>, config: &MonitorConfig) -> Self {
        Self::new(backend).with_idle_timeout(config.stream_idle_timeout)
    }

    /// Treat a stream that stays silent for `timeout` as a dropped
    /// connection.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Subscribe to projection changes.
    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.session.subscribe()
    }

    /// Point-in-time copy of the projection.
    pub fn state(&self) -> ExecutionState {
        self.session.snapshot()
    }

    /// Handle of the open connection. `None` once the connection has closed
    /// for any reason.
    pub fn connection_handle(&self) -> Option<ConnectionHandle> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|task| !task.is_finished())
            .map(ActiveTask::handle)
            .filter(|handle| self.session.is_current(*handle))
    }

    /// `true` while a stream connection is open.
    pub fn is_connected(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Create a new execution and start following its stream.
    ///
    /// Any previous connection is closed before the creation request is
    /// sent. Returns the new execution's id once creation succeeds; the
    /// stream is opened in the background.
    pub async fn launch(
        &self,
        template_id: impl Into<String>,
        project_id: impl Into<String>,
        inputs: serde_json::Value,
    ) -> Result<ExecutionId, LaunchError> {
        self.close_connection();

        let handle = self.session.begin(ExecutionState::default());
        self.session.apply(handle, ExecutionUpdate::Launching);

        let request = CreateExecutionRequest {
            template_id: template_id.into(),
            project_id: project_id.into(),
            inputs,
        };

        tracing::info!(
            template_id = %request.template_id,
            project_id = %request.project_id,
            generation = handle.generation(),
            "Launching workflow execution",
        );

        let created = match self.backend.create_execution(&request).await {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(
                    template_id = %request.template_id,
                    error = %e,
                    "Execution creation failed",
                );
                self.session
                    .apply(handle, ExecutionUpdate::LaunchFailed(e.to_string()));
                return Err(LaunchError::Create(e));
            }
        };
        let execution_id = created.id;

        if self
            .session
            .apply(handle, ExecutionUpdate::Launched(execution_id.clone()))
            .is_none()
        {
            tracing::info!(
                execution_id = %execution_id,
                "Launch superseded before the stream was opened",
            );
            return Err(LaunchError::Superseded(execution_id));
        }

        // Spawn under the slot lock: a `cancel()` or `launch()` racing with
        // us either supersedes the handle before this check or takes the
        // guard stored below.
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.session.is_current(handle) {
            return Err(LaunchError::Superseded(execution_id));
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_stream(
            Arc::clone(&self.backend),
            Arc::clone(&self.session),
            handle,
            execution_id.clone(),
            self.idle_timeout,
            cancel.clone(),
        ));
        *active = Some(ActiveTask::new(handle, cancel, task));

        Ok(execution_id)
    }

    /// Close the connection and reset the projection to `idle`.
    ///
    /// Connection-local only: the remote execution keeps running (use the
    /// control surface to stop it). Calling this again is a no-op.
    pub fn cancel(&self) {
        self.session.reset();
        if let Some(task) = self.take_active() {
            tracing::info!(
                generation = task.handle().generation(),
                "Execution stream cancelled",
            );
        }
    }

    /// Apply an event on behalf of the connection identified by `handle`.
    ///
    /// This is the single entry point for streamed events. Returns `false`
    /// (and changes nothing) when `handle` no longer identifies the active
    /// connection.
    pub fn ingest(&self, handle: ConnectionHandle, event: ProgressEvent) -> bool {
        self.session
            .apply(handle, ExecutionUpdate::Event(event))
            .is_some()
    }

    fn close_connection(&self) {
        if let Some(task) = self.take_active() {
            self.session.end();
            tracing::debug!(
                generation = task.handle().generation(),
                "Closing previous execution stream",
            );
        }
    }

    fn take_active(&self) -> Option<ActiveTask> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Follow the stream, then retire `handle` so nothing more can be applied
/// on behalf of the closed connection.
async fn run_stream(
    backend: Arc<dyn ExecutionBackend>,
    session: Arc<Session>,
    handle: ConnectionHandle,
    execution_id: ExecutionId,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
) {
    follow_stream(
        backend,
        &session,
        handle,
        &execution_id,
        idle_timeout,
        &cancel,
    )
    .await;

    if session.end_if_current(handle) {
        tracing::debug!(
            execution_id = %execution_id,
            generation = handle.generation(),
            "Connection handle retired",
        );
    }
}

/// Open the stream and fold its events into the session until the stream
/// ends, a terminal event arrives, or the session is superseded.
///
/// The stream is owned by this future: every return path drops it.
async fn follow_stream(
    backend: Arc<dyn ExecutionBackend>,
    session: &Session,
    handle: ConnectionHandle,
    execution_id: &ExecutionId,
    idle_timeout: Option<Duration>,
    cancel: &CancellationToken,
) {
    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = backend.open_stream(execution_id) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(
                execution_id = %execution_id,
                error = %e,
                "Failed to open execution stream",
            );
            session.apply(
                handle,
                ExecutionUpdate::TransportFailed(CONNECTION_LOST_MESSAGE.to_string()),
            );
            return;
        }
    };

    tracing::info!(execution_id = %execution_id, "Execution stream opened");

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = next_frame(&mut stream, idle_timeout) => frame,
        };

        let update = match frame {
            Some(Ok(text)) => match decode_frame(execution_id, &text) {
                Some(event) => {
                    tracing::debug!(
                        execution_id = %execution_id,
                        kind = event.kind(),
                        "Stream event received",
                    );
                    ExecutionUpdate::Event(event)
                }
                None => continue,
            },
            Some(Err(e)) => {
                tracing::error!(execution_id = %execution_id, error = %e, "Execution stream failed");
                ExecutionUpdate::TransportFailed(transport_failure_message(&e))
            }
            None => {
                tracing::warn!(
                    execution_id = %execution_id,
                    "Execution stream closed before a terminal event",
                );
                ExecutionUpdate::TransportFailed(CONNECTION_LOST_MESSAGE.to_string())
            }
        };

        match session.apply(handle, update) {
            None => return,
            Some(Flow::Continue) => {}
            Some(flow) => {
                tracing::info!(
                    execution_id = %execution_id,
                    ?flow,
                    status = %session.snapshot().status,
                    "Closing execution stream",
                );
                return;
            }
        }
    }
}

fn transport_failure_message(error: &StreamError) -> String {
    match error {
        StreamError::Transport(_) => CONNECTION_LOST_MESSAGE.to_string(),
        StreamError::Idle(_) => format!("{CONNECTION_LOST_MESSAGE}: {error}"),
    }
}
