//! The single update type both synchronization channels produce.
//!
//! The polling driver emits snapshot results, the streaming driver emits
//! creation outcomes, decoded events and transport failures. All of them
//! are folded into the projection by
//! [`ExecutionState::apply`](crate::projection::ExecutionState::apply), so
//! status and termination rules live in one place.

use crate::events::ProgressEvent;
use crate::snapshot::ExecutionSnapshot;
use crate::types::ExecutionId;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionUpdate {
    /// A creation request for a new execution is in flight.
    Launching,

    /// The engine accepted the creation request and assigned an id.
    Launched(ExecutionId),

    /// The creation request failed; no remote execution exists.
    LaunchFailed(String),

    /// A REST read returned the authoritative state.
    Snapshot(ExecutionSnapshot),

    /// A REST read failed. Recoverable: status is left untouched.
    FetchFailed(String),

    /// An event was decoded from the stream.
    Event(ProgressEvent),

    /// The stream connection dropped before any terminal event.
    TransportFailed(String),
}

/// What the driver that produced an update should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep synchronizing.
    Continue,
    /// The projection holds a terminal status; stop issuing network calls.
    Terminal,
    /// The stream signalled `done`; close the connection, status unchanged.
    EndOfStream,
}

impl Flow {
    /// `true` when the producing connection or schedule should be torn down.
    pub fn should_stop(self) -> bool {
        !matches!(self, Self::Continue)
    }
}
