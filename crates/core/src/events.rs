//! Progress events pushed over the execution stream.
//!
//! The engine sends one JSON object per server-sent event, discriminated by
//! its `"type"` field:
//!
//! ```json
//! {"type":"progress","progress":10,"message":"starting"}
//! {"type":"node_complete","node_id":"n1","data":{"outputs":{"x":1}}}
//! {"type":"complete","progress":100,"message":"done","data":{"outputs":{"final":"ok"}}}
//! ```
//!
//! This module deserializes them into a strongly-typed [`ProgressEvent`].

use serde::{Deserialize, Serialize};

/// All known streamed event types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Incremental progress (percentage, message and/or current node).
    Progress(ProgressData),

    /// A node finished and produced output.
    NodeComplete(NodeCompleteData),

    /// The execution failed. Terminal.
    Error(ErrorData),

    /// The execution finished successfully. Terminal.
    Complete(CompleteData),

    /// End-of-stream sentinel: nothing further arrives on this connection.
    Done,
}

/// Payload for `progress` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressData {
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// Payload for `node_complete` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCompleteData {
    pub node_id: String,
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: OutputData,
}

/// Payload for `error` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Human-readable failure description, propagated verbatim.
    #[serde(default, alias = "error")]
    pub message: Option<String>,
    /// The node that failed, when the engine knows it.
    #[serde(default)]
    pub node_id: Option<String>,
}

/// Payload for `complete` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteData {
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: OutputData,
}

/// The `data` envelope wrapping node or final outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    #[serde(default)]
    pub outputs: serde_json::Value,
}

impl ProgressEvent {
    /// Wire name of the event's `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::NodeComplete(_) => "node_complete",
            Self::Error(_) => "error",
            Self::Complete(_) => "complete",
            Self::Done => "done",
        }
    }

    /// `true` for events after which the execution can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Complete(_))
    }
}

/// Parse one streamed text frame into a typed event.
///
/// Returns `Err` for malformed JSON, missing required fields, or unknown
/// `type` values. Callers should log and skip such frames.
pub fn parse_event(text: &str) -> Result<ProgressEvent, serde_json::Error> {
    serde_json::from_str(text)
}
