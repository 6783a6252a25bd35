//! Polling driver: periodic REST snapshots of one execution.
//!
//! [`PollingDriver::start`] fetches immediately, then waits `interval`
//! after each fetch completes before issuing the next one, so slow
//! responses never overlap. A terminal status ends the schedule; fetch
//! failures are recorded in the projection and polling carries on.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use cadence_core::projection::ExecutionState;
use cadence_core::types::ExecutionId;
use cadence_core::update::ExecutionUpdate;

use crate::backend::ExecutionBackend;
use crate::session::{ActiveTask, ConnectionHandle, Session};

/// Polls one execution at a time and owns the resulting projection.
///
/// Several drivers may poll the same execution independently; each keeps
/// its own projection. Dropping the driver stops its schedule.
pub struct PollingDriver {
    backend: Arc<dyn ExecutionBackend>,
    session: Arc<Session>,
    active: Mutex<Option<ActiveTask>>,
}

impl PollingDriver {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            backend,
            session: Arc::new(Session::new()),
            active: Mutex::new(None),
        }
    }

    /// Subscribe to projection changes.
    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.session.subscribe()
    }

    /// Point-in-time copy of the projection.
    pub fn state(&self) -> ExecutionState {
        self.session.snapshot()
    }

    /// Begin polling `execution_id` every `interval`.
    ///
    /// Any previous schedule is torn down first and the projection is reset
    /// to the new execution. Must be called from within a Tokio runtime.
    pub fn start(&self, execution_id: ExecutionId, interval: Duration) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        drop(active.take());

        let handle = self
            .session
            .begin(ExecutionState::for_execution(execution_id.clone()));
        let cancel = CancellationToken::new();

        tracing::info!(
            execution_id = %execution_id,
            interval_ms = interval.as_millis() as u64,
            generation = handle.generation(),
            "Polling started",
        );

        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.backend),
            Arc::clone(&self.session),
            handle,
            execution_id,
            interval,
            cancel.clone(),
        ));

        *active = Some(ActiveTask::new(handle, cancel, task));
    }

    /// Cancel the schedule. In-flight fetches are abandoned, not awaited.
    /// Calling this when nothing is running is a no-op.
    pub fn stop(&self) {
        let stopped = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(task) = stopped {
            self.session.end();
            tracing::info!(generation = task.handle().generation(), "Polling stopped");
        }
    }

    /// `true` while a schedule is armed (not stopped and not yet terminal).
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

/// Fetch -> apply -> sleep until cancelled, superseded, or terminal.
async fn poll_loop(
    backend: Arc<dyn ExecutionBackend>,
    session: Arc<Session>,
    handle: ConnectionHandle,
    execution_id: ExecutionId,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = backend.fetch_execution(&execution_id) => result,
        };

        let update = match result {
            Ok(snapshot) => {
                tracing::debug!(
                    execution_id = %execution_id,
                    status = %snapshot.status,
                    progress = snapshot.progress,
                    "Snapshot fetched",
                );
                ExecutionUpdate::Snapshot(snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    execution_id = %execution_id,
                    error = %e,
                    "Snapshot fetch failed, will retry",
                );
                ExecutionUpdate::FetchFailed(e.to_string())
            }
        };

        match session.apply(handle, update) {
            None => return,
            Some(flow) if flow.should_stop() => {
                tracing::info!(
                    execution_id = %execution_id,
                    status = %session.snapshot().status,
                    "Terminal status observed, polling finished",
                );
                return;
            }
            Some(_) => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
