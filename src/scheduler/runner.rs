//! Per-job execution: bridge event loop, timeout, and bounded retry.
//!
//! Each dispatched job runs as an explicit attempt loop (attempt counter,
//! bounded maximum) rather than recursing on failure; the failed attempt's
//! invocation is fully drained before a retry dispatches, so invocations
//! never overlap.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::WorkerEvent;
use crate::models::job::Job;
use crate::models::progress::{OutboundFrame, ProgressEvent};
use crate::models::session::Session;
use crate::protocol::event::ProtocolEvent;
use crate::protocol::translator::StreamTranslator;
use crate::scheduler::queue::JobScheduler;
use crate::AppError;

/// Terminal state of one worker attempt.
#[derive(Debug)]
enum AttemptOutcome {
    /// Worker produced a final answer.
    Completed { text: String },
    /// Worker exited cleanly but produced no final text.
    NoOutput,
    /// Diagnostics flagged a stale-session condition and no answer arrived.
    Transient,
    /// Wall-clock bound exceeded; the invocation was cancelled.
    TimedOut,
    /// Spawn or stream failure.
    Failed(String),
    /// Worker exited abnormally without an answer.
    Crashed(String),
}

impl JobScheduler {
    /// Run one job to a terminal state, including any authorized retry.
    pub(super) async fn run_job(&self, job: &Job) {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let session = self.session.current().await;
            let queued_ms = (Utc::now() - job.enqueued_at).num_milliseconds();
            info!(
                sender = %job.sender,
                attempt = attempts,
                session_id = %session.id,
                resume = session.started,
                queued_ms,
                "dispatching job"
            );

            match self.run_attempt(job, session).await {
                AttemptOutcome::Completed { text } => {
                    self.session.mark_started().await;
                    info!(sender = %job.sender, "job completed");
                    self.publish(OutboundFrame::Message {
                        username: self.settings.agent_name.clone(),
                        message: text,
                    })
                    .await;
                    return;
                }
                AttemptOutcome::TimedOut => {
                    // The worker's state after a forced kill is unknown.
                    warn!(sender = %job.sender, "job timed out");
                    self.session.reset().await;
                    let err = AppError::Timeout(format!(
                        "job exceeded {}s",
                        self.settings.job_timeout.as_secs()
                    ));
                    self.publish_error(err.to_string()).await;
                    return;
                }
                AttemptOutcome::Transient => {
                    if self.retry.should_retry(true, attempts) {
                        warn!(
                            sender = %job.sender,
                            attempt = attempts,
                            "transient session error, retrying with a fresh session"
                        );
                        self.publish(
                            ProgressEvent::Retry {
                                message: "stale session detected, retrying with a fresh session"
                                    .into(),
                            }
                            .into(),
                        )
                        .await;
                        self.session.reset().await;
                        continue;
                    }
                    warn!(sender = %job.sender, "session error persisted after retry");
                    let err = AppError::Session("error persisted after retry".into());
                    self.publish_error(err.to_string()).await;
                    return;
                }
                AttemptOutcome::NoOutput => {
                    self.publish_error("no response from worker".into()).await;
                    return;
                }
                AttemptOutcome::Failed(message) | AttemptOutcome::Crashed(message) => {
                    self.publish_error(message).await;
                    return;
                }
            }
        }
    }

    /// Run a single worker invocation for `job` under `session`.
    async fn run_attempt(&self, job: &Job, session: Session) -> AttemptOutcome {
        self.publish(
            ProgressEvent::Start {
                message: format!("{} started processing", self.settings.agent_name),
            }
            .into(),
        )
        .await;

        let cancel = CancellationToken::new();
        let mut events = match self
            .bridge
            .run(job.prompt(), session, cancel.clone())
            .await
        {
            Ok(events) => events,
            Err(err) => return AttemptOutcome::Failed(err.to_string()),
        };

        let mut translator = StreamTranslator::new(&self.settings.project_root);
        let deadline = Instant::now() + self.settings.job_timeout;
        let mut final_text = String::new();
        let mut transient_seen = false;
        let mut fault: Option<String> = None;
        let mut exit_code: Option<i32> = None;
        let mut exited = false;
        let mut timed_out = false;

        loop {
            if Instant::now() >= deadline {
                timed_out = true;
                cancel.cancel();
                break;
            }

            match timeout(self.settings.poll_interval, events.recv()).await {
                // Poll tick: re-check the deadline.
                Err(_) => continue,
                Ok(None) => break,
                Ok(Some(WorkerEvent::Line(line))) => {
                    for event in translator.decode(&line) {
                        self.forward_event(event, &mut final_text).await;
                    }
                }
                Ok(Some(WorkerEvent::Diagnostic(line))) => {
                    debug!(line = %line, "worker diagnostic");
                    if self.retry.classifier.is_transient(&line) {
                        warn!(line = %line, "transient session marker in diagnostics");
                        transient_seen = true;
                    }
                }
                Ok(Some(WorkerEvent::Fault(message))) => {
                    fault = Some(message);
                    cancel.cancel();
                }
                Ok(Some(WorkerEvent::Done(code))) => {
                    exit_code = code;
                    exited = true;
                    break;
                }
            }
        }

        // The attempt must be fully joined before anything re-dispatches.
        drain_to_close(&mut events, self.settings.drain_grace).await;

        if timed_out {
            return AttemptOutcome::TimedOut;
        }
        if let Some(message) = fault {
            return AttemptOutcome::Failed(format!("worker stream failure: {message}"));
        }
        if !final_text.is_empty() {
            return AttemptOutcome::Completed { text: final_text };
        }
        if transient_seen {
            return AttemptOutcome::Transient;
        }
        match exit_code {
            Some(code) if code != 0 => {
                AttemptOutcome::Crashed(format!("worker exited with code {code}"))
            }
            None if exited => AttemptOutcome::Crashed("worker terminated by signal".into()),
            _ => AttemptOutcome::NoOutput,
        }
    }

    /// Map one protocol event onto the outbound progress wire, tracking the
    /// running final answer (last write wins; `result` text is
    /// authoritative).
    async fn forward_event(&self, event: ProtocolEvent, final_text: &mut String) {
        match event {
            ProtocolEvent::Init { model, session_id } => {
                info!(model = %model, session_id = %session_id, "worker initialized");
                self.publish(ProgressEvent::Init { model, session_id }.into())
                    .await;
            }
            ProtocolEvent::ToolStart {
                turn,
                tool,
                detail,
                edit_info,
            } => {
                info!(turn, tool = %tool, detail = %detail, "tool started");
                self.publish(
                    ProgressEvent::ToolStart {
                        turn,
                        tool,
                        detail,
                        edit_info,
                    }
                    .into(),
                )
                .await;
            }
            ProtocolEvent::ToolEnd { turn, lines } => {
                self.publish(ProgressEvent::ToolEnd { turn, lines }.into())
                    .await;
            }
            ProtocolEvent::Text { content } => {
                *final_text = content;
            }
            ProtocolEvent::Result {
                turns,
                duration_ms,
                cost_usd,
                input_tokens,
                output_tokens,
                cache_read_tokens,
                text,
            } => {
                if let Some(text) = text {
                    if !text.is_empty() {
                        *final_text = text;
                    }
                }
                let duration_sec = to_seconds(duration_ms);
                info!(
                    turns,
                    duration_sec, cost_usd, "worker reported run totals"
                );
                self.publish(
                    ProgressEvent::Complete {
                        duration_sec,
                        cost_usd,
                        cost_local: cost_usd * self.settings.usd_rate,
                        currency: self.settings.currency.clone(),
                        input_tokens: input_tokens + cache_read_tokens,
                        output_tokens,
                        turns,
                    }
                    .into(),
                )
                .await;
            }
        }
    }

    async fn publish_error(&self, message: String) {
        self.publish(ProgressEvent::Error { message }.into()).await;
    }
}

/// Await channel closure so the invocation's tasks are known to be done,
/// bounded so a stuck sender cannot wedge the scheduler.
async fn drain_to_close(events: &mut mpsc::Receiver<WorkerEvent>, bound: Duration) {
    let drained = timeout(bound, async {
        while events.recv().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!("worker event channel did not close within the drain bound");
    }
}

/// Milliseconds to fractional seconds for display.
#[allow(clippy::cast_precision_loss)]
fn to_seconds(duration_ms: u64) -> f64 {
    duration_ms as f64 / 1000.0
}
