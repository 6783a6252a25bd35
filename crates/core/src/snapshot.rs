//! REST shape of `GET /workflows/executions/{id}`.

use serde::{Deserialize, Serialize};

use crate::status::ExecutionStatus;
use crate::types::{ExecutionId, Timestamp};

/// Authoritative point-in-time view of one execution, as returned by the
/// workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: ExecutionId,
    pub status: ExecutionStatus,
    /// Completion percentage (0-100).
    #[serde(default)]
    pub progress: i32,
    /// The node currently executing, if any.
    #[serde(default, alias = "current_node")]
    pub current_node_id: Option<String>,
    #[serde(default, alias = "error")]
    pub error_message: Option<String>,
    /// Cost accumulated by the execution so far.
    #[serde(default, alias = "cost")]
    pub total_cost: f64,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    /// Echo of the configuration the execution was launched with.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ExecutionSnapshot {
    /// Minimal snapshot carrying only an id and status.
    pub fn new(id: impl Into<ExecutionId>, status: ExecutionStatus) -> Self {
        Self {
            id: id.into(),
            status,
            progress: 0,
            current_node_id: None,
            error_message: None,
            total_cost: 0.0,
            started_at: None,
            completed_at: None,
            config: serde_json::Value::Null,
        }
    }

    pub fn with_progress(mut self, progress: i32) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}
