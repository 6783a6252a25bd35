//! Workflow execution monitoring and control client.
//!
//! Tracks a long-running server-side workflow execution over two
//! complementary channels: periodic REST snapshots ([`poller`]) and a
//! server-sent-events stream ([`streamer`]). Both fold their updates into
//! an [`ExecutionState`](cadence_core::projection::ExecutionState)
//! projection published through a `tokio::sync::watch` channel.
//! [`control`] issues pause/resume/stop commands without touching the
//! projection.

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod control;
pub mod poller;
pub mod session;
pub mod stream;
pub mod streamer;
