//! Process-backed worker bridge.
//!
//! Owns one worker invocation end to end: spawn with session flags, write
//! the prompt to stdin and close it, drain stdout and stderr concurrently
//! into a single ordered event channel, then wait for process exit with
//! bounded escalation (grace wait → interrupt → forced kill).
//!
//! Both reader loops observe the job's cancellation token and stop within
//! one read poll of it firing; the terminal [`WorkerEvent::Done`] is only
//! emitted after both readers have finished draining, so no event is lost
//! between the marker and process cleanup.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::spawner::{spawn_worker, WorkerProcess};
use crate::bridge::{WorkerBridge, WorkerEvent};
use crate::config::WorkerConfig;
use crate::models::session::Session;
use crate::protocol::codec::LineCodec;
use crate::{AppError, Result};

/// Capacity of the per-invocation event channel.
const CHANNEL_CAPACITY: usize = 256;

/// Spawns the external worker CLI for each job.
#[derive(Debug)]
pub struct ProcessBridge {
    config: WorkerConfig,
}

impl ProcessBridge {
    /// Create a bridge over the given worker settings.
    #[must_use]
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }
}

impl WorkerBridge for ProcessBridge {
    fn run(
        &self,
        prompt: String,
        session: Session,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<WorkerEvent>>> + Send + '_>> {
        Box::pin(async move {
            let process = spawn_worker(&self.config, &session)?;
            let grace = Duration::from_secs(self.config.grace_seconds);

            let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
            tokio::spawn(supervise(process, prompt, event_tx, cancel, grace));

            Ok(event_rx)
        })
    }
}

/// Drive one invocation to completion: prompt in, streams out, exit wait.
async fn supervise(
    process: WorkerProcess,
    prompt: String,
    event_tx: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
    grace: Duration,
) {
    let WorkerProcess {
        mut child,
        mut stdin,
        stdout,
        stderr,
    } = process;

    if let Err(err) = deliver_prompt(&mut stdin, &prompt).await {
        // The process is likely already dead; report without blocking and
        // let the readers run to EOF.
        warn!(%err, "failed to deliver prompt to worker stdin");
        let fault = WorkerEvent::Fault(format!("failed to write prompt: {err}"));
        if event_tx.send(fault).await.is_err() {
            debug!("event channel closed before prompt fault could be delivered");
        }
    }
    drop(stdin);

    let stdout_reader = spawn_line_reader(stdout, event_tx.clone(), cancel.clone(), false);
    let stderr_reader = spawn_line_reader(stderr, event_tx.clone(), cancel.clone(), true);
    let _ = tokio::join!(stdout_reader, stderr_reader);

    let exit_code = shutdown(&mut child, &cancel, grace).await;
    if event_tx.send(WorkerEvent::Done(exit_code)).await.is_err() {
        debug!("event channel closed before Done could be delivered");
    }
}

/// Write the prompt and close stdin to signal end-of-input.
async fn deliver_prompt(stdin: &mut ChildStdin, prompt: &str) -> std::io::Result<()> {
    stdin.write_all(prompt.as_bytes()).await?;
    stdin.shutdown().await?;
    Ok(())
}

/// Read one output stream line by line into the shared event channel.
///
/// Over-long lines are skipped (framing noise); an I/O error emits a
/// [`WorkerEvent::Fault`] and stops the loop. The loop also stops when the
/// cancellation token fires or the channel consumer goes away.
fn spawn_line_reader<R>(
    stream: R,
    event_tx: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
    diagnostic: bool,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, LineCodec::new());

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!(diagnostic, "stream reader: cancellation received, stopping");
                    break;
                }

                item = framed.next() => {
                    match item {
                        None => break,

                        Some(Err(AppError::Protocol(msg))) => {
                            warn!(diagnostic, error = msg.as_str(), "stream framing error, skipping line");
                        }

                        Some(Err(err)) => {
                            let fault = WorkerEvent::Fault(format!("stream read failed: {err}"));
                            if event_tx.send(fault).await.is_err() {
                                debug!(diagnostic, "event channel closed, stopping reader");
                            }
                            break;
                        }

                        Some(Ok(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let event = if diagnostic {
                                WorkerEvent::Diagnostic(line)
                            } else {
                                WorkerEvent::Line(line)
                            };
                            if event_tx.send(event).await.is_err() {
                                debug!(diagnostic, "event channel closed, stopping reader");
                                break;
                            }
                        }
                    }
                }
            }
        }
    })
}

/// Wait for process exit with bounded escalation.
///
/// After cancellation the worker's internal state is unknown, so the
/// interrupt is sent immediately; on the normal path the process gets one
/// grace period to exit on its own first.
async fn shutdown(child: &mut Child, cancel: &CancellationToken, grace: Duration) -> Option<i32> {
    if cancel.is_cancelled() {
        send_interrupt(child);
        return wait_or_kill(child, grace).await;
    }

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => status.code(),
        Ok(Err(err)) => {
            warn!(%err, "error waiting for worker process");
            None
        }
        Err(_) => {
            warn!("worker did not exit within grace period, interrupting");
            send_interrupt(child);
            wait_or_kill(child, grace).await
        }
    }
}

/// Final bounded wait after an interrupt, escalating to a forced kill.
async fn wait_or_kill(child: &mut Child, grace: Duration) -> Option<i32> {
    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => status.code(),
        Ok(Err(err)) => {
            warn!(%err, "error waiting for worker process");
            None
        }
        Err(_) => {
            warn!("worker did not exit after interrupt, forcing kill");
            if let Err(err) = child.kill().await {
                warn!(%err, "failed to kill worker process");
            }
            child.wait().await.ok().and_then(|status| status.code())
        }
    }
}

#[cfg(unix)]
fn send_interrupt(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else { return };
    let Ok(pid) = i32::try_from(pid) else { return };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGINT) {
        warn!(%err, "failed to send SIGINT to worker process");
    }
}

#[cfg(not(unix))]
fn send_interrupt(_child: &Child) {}
