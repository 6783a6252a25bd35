//! Integration tests for the control surface.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::sync::watch;

use cadence_core::command::ExecutionCommand;
use cadence_core::projection::ExecutionState;
use cadence_core::status::ExecutionStatus;
use cadence_core::types::ExecutionId;
use cadence_monitor::api::ApiError;
use cadence_monitor::control::{ControlError, ControlSurface};
use cadence_monitor::poller::PollingDriver;

use common::{snapshot, wait_for_state, ScriptedBackend};

fn projection(id: &str, status: ExecutionStatus) -> ExecutionState {
    ExecutionState {
        status,
        ..ExecutionState::for_execution(ExecutionId::new(id))
    }
}

fn surface(
    backend: &Arc<ScriptedBackend>,
    state: ExecutionState,
) -> (watch::Sender<ExecutionState>, ControlSurface) {
    let (tx, rx) = watch::channel(state);
    (tx, ControlSurface::new(backend.clone(), rx))
}

fn approve(_: &ExecutionId) -> bool {
    true
}

fn decline(_: &ExecutionId) -> bool {
    false
}

// ---------------------------------------------------------------------------
// Test: commands against a finished execution
// ---------------------------------------------------------------------------

/// A poller observes `completed`; every command is refused locally and the
/// engine's own 409 surfaces when the local check is bypassed.
#[tokio::test(start_paused = true)]
async fn commands_after_completion_are_refused() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.script_snapshots("ex-1", vec![snapshot("ex-1", ExecutionStatus::Completed)]);
    backend.reject_commands(409, "Execution is already completed");

    let poller = PollingDriver::new(backend.clone());
    let mut rx = poller.subscribe();
    poller.start(ExecutionId::new("ex-1"), Duration::from_secs(2));
    wait_for_state(&mut rx, |s| s.is_terminal()).await;

    let control = ControlSurface::new(backend.clone(), poller.subscribe());
    for command in [
        ExecutionCommand::Pause,
        ExecutionCommand::Resume,
        ExecutionCommand::Stop,
    ] {
        assert!(!control.is_enabled(command));
    }

    assert_matches!(
        control.stop(&approve).await,
        Err(ControlError::NotPermitted {
            command: ExecutionCommand::Stop,
            status: ExecutionStatus::Completed,
        })
    );
    assert_matches!(control.pause().await, Err(ControlError::NotPermitted { .. }));
    assert!(backend.commands().is_empty());

    let before = poller.state();
    let error = control
        .send_unchecked(ExecutionCommand::Stop)
        .await
        .unwrap_err();
    assert_matches!(
        &error,
        ControlError::Rejected(ApiError::Api { status: 409, detail }) if detail.contains("already completed")
    );
    assert_eq!(backend.commands().len(), 1);
    assert_eq!(poller.state(), before);
    assert_eq!(poller.state().status, ExecutionStatus::Completed);
}

// ---------------------------------------------------------------------------
// Test: pause / resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pause_is_sent_without_touching_projection() {
    let backend = Arc::new(ScriptedBackend::new());
    let (tx, control) = surface(&backend, projection("ex-1", ExecutionStatus::Running));

    assert!(control.is_enabled(ExecutionCommand::Pause));
    assert!(!control.is_enabled(ExecutionCommand::Resume));

    control.pause().await.unwrap();
    assert_eq!(
        backend.commands(),
        vec![(ExecutionId::new("ex-1"), ExecutionCommand::Pause)]
    );
    // Still running until the engine confirms the transition.
    assert_eq!(tx.borrow().status, ExecutionStatus::Running);
}

#[tokio::test]
async fn resume_requires_paused() {
    let backend = Arc::new(ScriptedBackend::new());
    let (tx, control) = surface(&backend, projection("ex-1", ExecutionStatus::Running));

    assert_matches!(
        control.resume().await,
        Err(ControlError::NotPermitted {
            command: ExecutionCommand::Resume,
            status: ExecutionStatus::Running,
        })
    );

    tx.send_modify(|state| state.status = ExecutionStatus::Paused);
    assert!(control.is_enabled(ExecutionCommand::Resume));
    control.resume().await.unwrap();
    assert_eq!(
        backend.commands(),
        vec![(ExecutionId::new("ex-1"), ExecutionCommand::Resume)]
    );
}

#[tokio::test]
async fn eligibility_follows_live_projection() {
    let backend = Arc::new(ScriptedBackend::new());
    let (tx, control) = surface(&backend, projection("ex-1", ExecutionStatus::Running));
    assert!(control.is_enabled(ExecutionCommand::Pause));

    tx.send_modify(|state| state.status = ExecutionStatus::Failed);
    assert!(!control.is_enabled(ExecutionCommand::Pause));
    assert_matches!(control.pause().await, Err(ControlError::NotPermitted { .. }));
    assert!(backend.commands().is_empty());
}

#[tokio::test]
async fn rejected_command_is_reported() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.reject_commands(503, "Engine busy");
    let (tx, control) = surface(&backend, projection("ex-1", ExecutionStatus::Running));

    let error = control.pause().await.unwrap_err();
    assert_matches!(error, ControlError::Rejected(ref e) if e.status() == Some(503));
    assert!(error.to_string().contains("Engine busy"));
    assert_eq!(tx.borrow().status, ExecutionStatus::Running);
}

// ---------------------------------------------------------------------------
// Test: stop confirmation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn declined_stop_sends_nothing() {
    let backend = Arc::new(ScriptedBackend::new());
    let (_tx, control) = surface(&backend, projection("ex-1", ExecutionStatus::Paused));

    assert_matches!(control.stop(&decline).await, Err(ControlError::NotConfirmed));
    assert!(backend.commands().is_empty());
}

#[tokio::test]
async fn confirmed_stop_is_sent() {
    let backend = Arc::new(ScriptedBackend::new());
    let (tx, control) = surface(&backend, projection("ex-1", ExecutionStatus::Paused));

    let asked = std::sync::Mutex::new(Vec::new());
    let confirm = |id: &ExecutionId| {
        asked.lock().unwrap().push(id.clone());
        true
    };

    control.stop(&confirm).await.unwrap();
    assert_eq!(*asked.lock().unwrap(), vec![ExecutionId::new("ex-1")]);
    assert_eq!(
        backend.commands(),
        vec![(ExecutionId::new("ex-1"), ExecutionCommand::Stop)]
    );
    assert_eq!(tx.borrow().status, ExecutionStatus::Paused);
}

/// The execution finishes while the confirmation prompt is open.
#[tokio::test]
async fn stop_revalidates_after_confirmation() {
    let backend = Arc::new(ScriptedBackend::new());
    let (tx, control) = surface(&backend, projection("ex-1", ExecutionStatus::Running));

    let confirm = |_: &ExecutionId| {
        tx.send_modify(|state| state.status = ExecutionStatus::Completed);
        true
    };

    assert_matches!(
        control.stop(&confirm).await,
        Err(ControlError::NotPermitted {
            status: ExecutionStatus::Completed,
            ..
        })
    );
    assert!(backend.commands().is_empty());
}

// ---------------------------------------------------------------------------
// Test: generic dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_asks_only_for_commands_needing_confirmation() {
    let backend = Arc::new(ScriptedBackend::new());
    let (tx, control) = surface(&backend, projection("ex-1", ExecutionStatus::Running));

    // `decline` is never consulted for pause.
    control
        .execute(ExecutionCommand::Pause, Some(&decline))
        .await
        .unwrap();

    tx.send_modify(|state| state.status = ExecutionStatus::Paused);
    control.execute(ExecutionCommand::Resume, None).await.unwrap();

    assert_matches!(
        control.execute(ExecutionCommand::Stop, None).await,
        Err(ControlError::NotConfirmed)
    );
    assert_matches!(
        control.execute(ExecutionCommand::Stop, Some(&decline)).await,
        Err(ControlError::NotConfirmed)
    );
    control
        .execute(ExecutionCommand::Stop, Some(&approve))
        .await
        .unwrap();

    assert_eq!(
        backend.commands(),
        vec![
            (ExecutionId::new("ex-1"), ExecutionCommand::Pause),
            (ExecutionId::new("ex-1"), ExecutionCommand::Resume),
            (ExecutionId::new("ex-1"), ExecutionCommand::Stop),
        ]
    );
}

#[tokio::test]
async fn stop_is_not_offered_for_idle_projection() {
    let backend = Arc::new(ScriptedBackend::new());
    let (_tx, control) = surface(&backend, ExecutionState::default());

    assert!(!control.is_enabled(ExecutionCommand::Stop));
    assert_matches!(control.stop(&approve).await, Err(ControlError::NoExecution));
    assert_matches!(
        control.send_unchecked(ExecutionCommand::Stop).await,
        Err(ControlError::NoExecution)
    );
    assert!(backend.commands().is_empty());
}
