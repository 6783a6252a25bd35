//! The seam between the drivers and the workflow engine.
//!
//! Drivers and the control surface only talk to an
//! [`ExecutionBackend`]. [`WorkflowApi`](crate::api::WorkflowApi) is the
//! HTTP implementation; tests substitute scripted in-memory backends.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use cadence_core::command::ExecutionCommand;
use cadence_core::snapshot::ExecutionSnapshot;
use cadence_core::status::ExecutionStatus;
use cadence_core::types::ExecutionId;

use crate::api::ApiError;

/// Raw text frames of one open execution stream, one per server-sent
/// event. Dropping the stream closes the underlying connection.
pub type EventStream = BoxStream<'static, Result<String, StreamError>>;

/// Body of `POST /workflows/executions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateExecutionRequest {
    pub template_id: String,
    pub project_id: String,
    pub inputs: serde_json::Value,
}

/// Response of `POST /workflows/executions`. Only the id is needed to open
/// the stream; the rest of the record is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedExecution {
    pub id: ExecutionId,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
}

/// Failures of an already-open execution stream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// The connection broke or the body could not be decoded as SSE.
    #[error("Stream transport error: {0}")]
    Transport(String),

    /// Nothing arrived within the configured idle window.
    #[error("No stream activity for {}s", .0.as_secs())]
    Idle(Duration),
}

/// Operations the monitoring client needs from the workflow engine.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Single authenticated read of an execution. No retries.
    async fn fetch_execution(&self, id: &ExecutionId) -> Result<ExecutionSnapshot, ApiError>;

    /// Create a new execution from a template.
    async fn create_execution(
        &self,
        request: &CreateExecutionRequest,
    ) -> Result<CreatedExecution, ApiError>;

    /// Issue a pause/resume/stop command. `Ok` means the engine accepted it.
    async fn send_command(
        &self,
        id: &ExecutionId,
        command: ExecutionCommand,
    ) -> Result<(), ApiError>;

    /// Open the server-push stream for an execution.
    async fn open_stream(&self, id: &ExecutionId) -> Result<EventStream, ApiError>;
}
