//! Domain model for monitoring remote workflow executions.
//!
//! Holds the wire shapes consumed from the workflow engine (snapshots and
//! streamed progress events), the execution status state machine, and the
//! client-side [`projection::ExecutionState`] that both synchronization
//! channels fold their updates into.

pub mod command;
pub mod events;
pub mod projection;
pub mod snapshot;
pub mod status;
pub mod types;
pub mod update;
