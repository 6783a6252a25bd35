//! Ownership of one driver's projection and of its background task.
//!
//! Every driver instance owns a [`Session`]: the projection (published
//! through a `watch` channel) plus a generation counter. Each time the
//! driver starts monitoring something new it calls [`Session::begin`] and
//! receives a fresh [`ConnectionHandle`]. Updates are only applied while
//! their handle is still the current one, and the check happens under the
//! channel's write lock, so a callback from a replaced or cancelled
//! connection can never write into the projection.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cadence_core::projection::ExecutionState;
use cadence_core::update::{ExecutionUpdate, Flow};

/// Identity of one monitoring session (one poll schedule or one stream
/// connection) within a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Projection plus the generation guard protecting it.
pub struct Session {
    /// Generation of the current handle; `0` before the first session.
    current: AtomicU64,
    state: watch::Sender<ExecutionState>,
}

impl Session {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ExecutionState::default());
        Self {
            current: AtomicU64::new(0),
            state,
        }
    }

    /// Subscribe to projection changes.
    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.state.subscribe()
    }

    /// Clone of the current projection.
    pub fn snapshot(&self) -> ExecutionState {
        self.state.borrow().clone()
    }

    /// Start a new session: every earlier handle becomes stale and the
    /// projection is replaced by `initial`.
    pub fn begin(&self, initial: ExecutionState) -> ConnectionHandle {
        let mut handle = ConnectionHandle(0);
        self.state.send_modify(|state| {
            handle = ConnectionHandle(self.current.fetch_add(1, Ordering::SeqCst) + 1);
            *state = initial;
        });
        handle
    }

    /// End the current session without starting another. The projection
    /// keeps its last value.
    pub fn end(&self) {
        self.state.send_if_modified(|_| {
            self.current.fetch_add(1, Ordering::SeqCst);
            false
        });
    }

    /// End the session identified by `handle`, unless a newer one has
    /// already replaced it. The projection keeps its last value.
    ///
    /// Returns `true` if `handle` was current and is now retired.
    pub fn end_if_current(&self, handle: ConnectionHandle) -> bool {
        let mut ended = false;
        self.state.send_if_modified(|_| {
            ended = self
                .current
                .compare_exchange(handle.0, handle.0 + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            false
        });
        ended
    }

    /// End the current session without starting another and reset the
    /// projection. Notifies subscribers only if the projection changed.
    pub fn reset(&self) {
        self.state.send_if_modified(|state| {
            self.current.fetch_add(1, Ordering::SeqCst);
            if *state == ExecutionState::default() {
                return false;
            }
            *state = ExecutionState::default();
            true
        });
    }

    pub fn is_current(&self, handle: ConnectionHandle) -> bool {
        self.current.load(Ordering::SeqCst) == handle.0
    }

    /// Apply `update` if `handle` is still current.
    ///
    /// Returns `None` (and leaves the projection untouched) for a stale
    /// handle, otherwise what the producer should do next.
    pub fn apply(&self, handle: ConnectionHandle, update: ExecutionUpdate) -> Option<Flow> {
        let mut flow = None;
        self.state.send_if_modified(|state| {
            if !self.is_current(handle) {
                return false;
            }
            flow = Some(state.apply(update));
            true
        });

        if flow.is_none() {
            tracing::debug!(
                generation = handle.generation(),
                "Dropping update from superseded session",
            );
        }
        flow
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// A running background task owned by a driver.
///
/// Dropping the guard cancels the task's token and aborts it, which drops
/// whatever connection the task holds. Replacing or clearing the slot that
/// holds an `ActiveTask` is therefore always a complete teardown.
pub struct ActiveTask {
    handle: ConnectionHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveTask {
    pub fn new(handle: ConnectionHandle, cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            handle,
            cancel,
            task,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    /// `true` once the task has exited on its own or been aborted.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ActiveTask {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}
