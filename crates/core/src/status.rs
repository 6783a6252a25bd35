//! Execution lifecycle status.
//!
//! `idle` and `launching` only ever exist on the client (before the remote
//! record exists or before creation is confirmed). `pending`, `running` and
//! `paused` are live remote states. `completed`, `failed` and `stopped` are
//! terminal: once observed, nothing further is synchronized for that
//! execution.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Pending,
    Launching,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl ExecutionStatus {
    /// `true` for `completed`, `failed` and `stopped`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// `true` for states that exist only on the client.
    pub fn is_client_local(self) -> bool {
        matches!(self, Self::Idle | Self::Launching)
    }

    /// `true` for `pending`, `running` and `paused`.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
