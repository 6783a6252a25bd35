//! Client-side reconciled view of one execution.
//!
//! [`ExecutionState`] is what presentation code reads. It is written only
//! through [`ExecutionState::apply`], which folds every
//! [`ExecutionUpdate`] (from either channel) into the view and tells the
//! producing driver whether to keep going.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use crate::events::ProgressEvent;
use crate::snapshot::ExecutionSnapshot;
use crate::status::ExecutionStatus;
use crate::types::{ExecutionId, Timestamp};
use crate::update::{ExecutionUpdate, Flow};

/// Recorded when the engine reports a failure without a message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Execution failed";

/// Recorded when the stream drops without the transport giving detail.
pub const CONNECTION_LOST_MESSAGE: &str = "Connection to execution stream lost";

/// Reconciled state of one monitored execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionState {
    /// `None` until a snapshot or a successful launch names the execution.
    pub execution_id: Option<ExecutionId>,
    pub status: ExecutionStatus,
    /// Completion percentage (0-100).
    pub progress: u8,
    /// Latest human-readable progress message.
    pub message: Option<String>,
    pub current_node: Option<String>,
    /// Per-node outputs keyed by node id. Entries are overwritten by later
    /// results for the same node but never removed.
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Aggregated outputs carried by the final `complete` event.
    pub final_outputs: Option<serde_json::Value>,
    /// Every stream event applied to this state, in receipt order.
    pub log: Vec<LogEntry>,
    pub error: Option<String>,
    pub total_cost: Option<f64>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// One received stream event, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub received_at: Timestamp,
    pub event: ProgressEvent,
}

impl ExecutionState {
    /// Idle state already bound to a known execution (polling an existing id).
    pub fn for_execution(id: ExecutionId) -> Self {
        Self {
            execution_id: Some(id),
            ..Self::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold one update into the state.
    ///
    /// Once the status is terminal it is frozen: updates that agree with
    /// the terminal outcome may only fill in missing detail, everything
    /// else is ignored.
    pub fn apply(&mut self, update: ExecutionUpdate) -> Flow {
        if self.is_terminal() {
            self.settle(update);
            return Flow::Terminal;
        }

        match update {
            ExecutionUpdate::Launching => {
                *self = Self {
                    status: ExecutionStatus::Launching,
                    ..Self::default()
                };
                Flow::Continue
            }
            ExecutionUpdate::Launched(id) => {
                self.execution_id = Some(id);
                self.status = ExecutionStatus::Running;
                Flow::Continue
            }
            ExecutionUpdate::LaunchFailed(message) | ExecutionUpdate::TransportFailed(message) => {
                self.fail(Some(message));
                Flow::Terminal
            }
            ExecutionUpdate::Snapshot(snapshot) => self.apply_snapshot(snapshot),
            ExecutionUpdate::FetchFailed(message) => {
                self.error = Some(message);
                Flow::Continue
            }
            ExecutionUpdate::Event(event) => self.apply_event(event),
        }
    }

    fn apply_snapshot(&mut self, snapshot: ExecutionSnapshot) -> Flow {
        if self.is_other_execution(&snapshot.id) {
            return Flow::Continue;
        }

        self.status = snapshot.status;
        self.progress = clamp_percent(snapshot.progress);
        self.current_node = snapshot.current_node_id;
        self.total_cost = Some(snapshot.total_cost);
        self.started_at = snapshot.started_at.or(self.started_at);
        self.completed_at = snapshot.completed_at;
        self.error = snapshot.error_message;
        self.execution_id = Some(snapshot.id);

        match snapshot.status {
            ExecutionStatus::Completed => {
                self.progress = 100;
                Flow::Terminal
            }
            ExecutionStatus::Failed => {
                let message = self.error.take();
                self.fail(message);
                Flow::Terminal
            }
            ExecutionStatus::Stopped => Flow::Terminal,
            _ => Flow::Continue,
        }
    }

    fn apply_event(&mut self, event: ProgressEvent) -> Flow {
        self.record(&event);

        match event {
            ProgressEvent::Progress(data) => {
                self.status = ExecutionStatus::Running;
                self.update_progress(data.progress, data.message);
                if data.node_id.is_some() {
                    self.current_node = data.node_id;
                }
                Flow::Continue
            }
            ProgressEvent::NodeComplete(data) => {
                self.status = ExecutionStatus::Running;
                self.update_progress(data.progress, data.message);
                self.outputs.insert(data.node_id, data.data.outputs);
                Flow::Continue
            }
            ProgressEvent::Error(data) => {
                self.fail(data.message);
                Flow::Terminal
            }
            ProgressEvent::Complete(data) => {
                self.status = ExecutionStatus::Completed;
                self.progress = 100;
                self.error = None;
                if data.message.is_some() {
                    self.message = data.message;
                }
                if !data.data.outputs.is_null() {
                    self.final_outputs = Some(data.data.outputs);
                }
                Flow::Terminal
            }
            ProgressEvent::Done => Flow::EndOfStream,
        }
    }

    /// Reconcile an update that arrives after a terminal status.
    fn settle(&mut self, update: ExecutionUpdate) {
        match update {
            ExecutionUpdate::Event(ProgressEvent::Complete(data))
                if self.status == ExecutionStatus::Completed =>
            {
                self.record(&ProgressEvent::Complete(data.clone()));
                if self.final_outputs.is_none() && !data.data.outputs.is_null() {
                    self.final_outputs = Some(data.data.outputs);
                }
                if self.message.is_none() {
                    self.message = data.message;
                }
            }
            ExecutionUpdate::Snapshot(snapshot)
                if snapshot.status == self.status && !self.is_other_execution(&snapshot.id) =>
            {
                if self.total_cost.is_none() {
                    self.total_cost = Some(snapshot.total_cost);
                }
                if self.started_at.is_none() {
                    self.started_at = snapshot.started_at;
                }
                if self.completed_at.is_none() {
                    self.completed_at = snapshot.completed_at;
                }
                if self.execution_id.is_none() {
                    self.execution_id = Some(snapshot.id);
                }
            }
            _ => {}
        }
    }

    fn fail(&mut self, message: Option<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(message.unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()));
    }

    fn update_progress(&mut self, progress: Option<i32>, message: Option<String>) {
        if let Some(progress) = progress {
            self.progress = clamp_percent(progress);
        }
        if message.is_some() {
            self.message = message;
        }
    }

    fn record(&mut self, event: &ProgressEvent) {
        self.log.push(LogEntry {
            received_at: Utc::now(),
            event: event.clone(),
        });
    }

    fn is_other_execution(&self, id: &ExecutionId) -> bool {
        self.execution_id.as_ref().is_some_and(|current| current != id)
    }
}

fn clamp_percent(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
