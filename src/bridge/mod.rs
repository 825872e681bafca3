//! Worker process bridge.
//!
//! The [`WorkerBridge`] trait decouples the job scheduler from the way a
//! worker is actually invoked. The production implementation,
//! [`process::ProcessBridge`], spawns the external CLI worker; tests
//! substitute scripted fakes.

pub mod process;
pub mod spawner;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::session::Session;
use crate::Result;

/// One item on a worker invocation's ordered event channel.
///
/// Lines from each stream are delivered in the order the worker emitted
/// them; primary and diagnostic lines may interleave but never reorder
/// within their own stream. [`WorkerEvent::Done`] is the terminal marker —
/// no further events follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// One line of primary structured output (stdout).
    Line(String),
    /// One line of diagnostic text (stderr).
    Diagnostic(String),
    /// A mid-job stream read or input write failed.
    Fault(String),
    /// Process exited; carries the exit code when one is available
    /// (`None` when the process was terminated by a signal).
    Done(Option<i32>),
}

/// Interface between the job scheduler and a worker invocation.
///
/// `run` starts one invocation for `prompt` under `session` and returns the
/// invocation's event channel. Raising `cancel` must stop both stream
/// readers promptly and terminate the process (gracefully, then forced);
/// the channel always ends with [`WorkerEvent::Done`] and closes once the
/// invocation is fully cleaned up.
pub trait WorkerBridge: Send + Sync {
    /// Start a worker invocation.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`](crate::AppError::Spawn) if the worker
    /// executable could not be launched.
    fn run(
        &self,
        prompt: String,
        session: Session,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<WorkerEvent>>> + Send + '_>>;
}
