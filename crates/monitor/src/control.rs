//! Pause/resume/stop commands against a live execution.
//!
//! The control surface never writes to the projection. A command only
//! asks the engine for a transition; the new status shows up once the
//! next snapshot or stream event confirms it. Eligibility is checked
//! against the live projection at call time, not against whatever the
//! caller saw when it rendered its buttons.

use std::sync::Arc;

use tokio::sync::watch;

use cadence_core::command::ExecutionCommand;
use cadence_core::projection::ExecutionState;
use cadence_core::status::ExecutionStatus;
use cadence_core::types::ExecutionId;

use crate::api::ApiError;
use crate::backend::ExecutionBackend;

/// Asks the user to confirm a destructive command.
pub trait Confirm: Sync {
    fn confirm(&self, execution_id: &ExecutionId) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&ExecutionId) -> bool + Sync,
{
    fn confirm(&self, execution_id: &ExecutionId) -> bool {
        self(execution_id)
    }
}

/// Errors returned by [`ControlSurface`] commands.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The projection does not name an execution yet.
    #[error("No execution is being monitored")]
    NoExecution,

    /// The projected status does not allow the command.
    #[error("Cannot {command} an execution that is {status}")]
    NotPermitted {
        command: ExecutionCommand,
        status: ExecutionStatus,
    },

    /// The user declined the confirmation prompt.
    #[error("Command was not confirmed")]
    NotConfirmed,

    /// The engine rejected the command or could not be reached.
    #[error("Command rejected: {0}")]
    Rejected(#[source] ApiError),
}

/// Issues control commands for the execution named by a projection.
pub struct ControlSurface {
    backend: Arc<dyn ExecutionBackend>,
    state: watch::Receiver<ExecutionState>,
}

impl ControlSurface {
    /// `state` is a receiver from the driver that owns the projection.
    pub fn new(backend: Arc<dyn ExecutionBackend>, state: watch::Receiver<ExecutionState>) -> Self {
        Self { backend, state }
    }

    /// Whether `command` is currently allowed (for enabling buttons).
    pub fn is_enabled(&self, command: ExecutionCommand) -> bool {
        self.validate(command).is_ok()
    }

    pub async fn pause(&self) -> Result<(), ControlError> {
        self.execute(ExecutionCommand::Pause, None).await
    }

    pub async fn resume(&self) -> Result<(), ControlError> {
        self.execute(ExecutionCommand::Resume, None).await
    }

    /// Stop the execution after `confirm` approves it. Irreversible.
    pub async fn stop(&self, confirm: &dyn Confirm) -> Result<(), ControlError> {
        self.execute(ExecutionCommand::Stop, Some(confirm)).await
    }

    /// Send `command` without checking the projected status.
    ///
    /// The engine stays the authority: a command it rejects comes back as
    /// [`ControlError::Rejected`].
    pub async fn send_unchecked(&self, command: ExecutionCommand) -> Result<(), ControlError> {
        let execution_id = self
            .state
            .borrow()
            .execution_id
            .clone()
            .ok_or(ControlError::NoExecution)?;
        self.send(execution_id, command).await
    }

    /// Check `command` against the live projection, ask for confirmation
    /// if the command needs it, and send it.
    ///
    /// A confirmed command is checked again after the answer, since the
    /// execution may have finished while the prompt was open. A command
    /// that needs confirmation is refused when no `confirm` is given;
    /// `confirm` is never consulted for the others.
    pub async fn execute(
        &self,
        command: ExecutionCommand,
        confirm: Option<&dyn Confirm>,
    ) -> Result<(), ControlError> {
        let mut execution_id = self.validate(command)?;

        if command.requires_confirmation() {
            let confirmed = confirm.is_some_and(|confirm| confirm.confirm(&execution_id));
            if !confirmed {
                tracing::info!(execution_id = %execution_id, %command, "Command not confirmed");
                return Err(ControlError::NotConfirmed);
            }
            execution_id = self.validate(command)?;
        }

        self.send(execution_id, command).await
    }

    fn validate(&self, command: ExecutionCommand) -> Result<ExecutionId, ControlError> {
        let state = self.state.borrow();
        let execution_id = state.execution_id.clone().ok_or(ControlError::NoExecution)?;
        if !command.permitted_from(state.status) {
            return Err(ControlError::NotPermitted {
                command,
                status: state.status,
            });
        }
        Ok(execution_id)
    }

    async fn send(
        &self,
        execution_id: ExecutionId,
        command: ExecutionCommand,
    ) -> Result<(), ControlError> {
        match self.backend.send_command(&execution_id, command).await {
            Ok(()) => {
                tracing::info!(
                    execution_id = %execution_id,
                    %command,
                    "Execution command accepted",
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    execution_id = %execution_id,
                    %command,
                    error = %e,
                    "Execution command rejected",
                );
                Err(ControlError::Rejected(e))
            }
        }
    }
}
