//! Control commands issued against a live execution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::ExecutionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionCommand {
    Pause,
    Resume,
    Stop,
}

impl ExecutionCommand {
    /// Action segment of `POST /workflows/executions/{id}/{action}`.
    pub fn action(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }

    /// Whether the command may be issued while the execution is in `status`.
    ///
    /// `pause` needs `running`, `resume` needs `paused`, and `stop` needs
    /// either of the two.
    pub fn permitted_from(self, status: ExecutionStatus) -> bool {
        match self {
            Self::Pause => status == ExecutionStatus::Running,
            Self::Resume => status == ExecutionStatus::Paused,
            Self::Stop => matches!(status, ExecutionStatus::Running | ExecutionStatus::Paused),
        }
    }

    /// Destructive commands need explicit user confirmation.
    pub fn requires_confirmation(self) -> bool {
        self == Self::Stop
    }
}

impl fmt::Display for ExecutionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}
