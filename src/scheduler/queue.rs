//! FIFO job queue with a single-flight drain loop.
//!
//! The queue and the drain flag live under one mutex: `submit` can race
//! with an in-progress drain from multiple inbound message sources, so
//! every mutation goes through that lock. At most one drain loop is ever
//! active — the single-flight guarantee for the shared worker.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bridge::WorkerBridge;
use crate::config::GlobalConfig;
use crate::hub::publisher::ProgressPublisher;
use crate::models::job::{Job, QueueSnapshot};
use crate::models::progress::OutboundFrame;
use crate::models::session::Session;
use crate::scheduler::retry::RetryPolicy;
use crate::scheduler::session::SessionManager;

/// Scheduler settings derived from [`GlobalConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Identity the worker's answers are broadcast under.
    pub agent_name: String,
    /// Base for rewriting absolute paths in progress details.
    pub project_root: PathBuf,
    /// Wall-clock bound for one job.
    pub job_timeout: Duration,
    /// Event wait poll interval (bounds cancellation/timeout latency).
    pub poll_interval: Duration,
    /// Bound on draining a finished invocation's channel to closure. Must
    /// cover the bridge's full escalation (grace wait, interrupt, kill).
    pub drain_grace: Duration,
    /// ISO code of the local currency shown next to USD cost.
    pub currency: String,
    /// USD to local-currency conversion rate.
    pub usd_rate: f64,
}

impl SchedulerSettings {
    /// Derive settings from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            agent_name: config.relay.agent_name.clone(),
            project_root: config.worker.project_root.clone(),
            job_timeout: config.job_timeout(),
            poll_interval: config.poll_interval(),
            drain_grace: config.exit_grace().saturating_mul(3),
            currency: config.relay.currency.clone(),
            usd_rate: config.relay.usd_rate,
        }
    }
}

/// Queue contents and the drain flags, mutated only under one lock.
#[derive(Debug, Default)]
pub(super) struct SchedulerState {
    pub(super) queue: VecDeque<Job>,
    pub(super) draining: bool,
    /// The head job currently occupies the worker. It stays queued until
    /// its terminal state, but snapshots list pending jobs only.
    pub(super) active: bool,
}

/// The serialized entry point for all job and session mutation.
///
/// Constructed once at startup and shared behind an [`Arc`]; there are no
/// ambient globals.
pub struct JobScheduler {
    pub(super) state: Mutex<SchedulerState>,
    pub(super) session: SessionManager,
    pub(super) bridge: Arc<dyn WorkerBridge>,
    pub(super) publisher: Arc<dyn ProgressPublisher>,
    pub(super) retry: RetryPolicy,
    pub(super) settings: SchedulerSettings,
}

impl JobScheduler {
    /// Build a scheduler over the given bridge and publisher.
    #[must_use]
    pub fn new(
        config: &GlobalConfig,
        bridge: Arc<dyn WorkerBridge>,
        publisher: Arc<dyn ProgressPublisher>,
    ) -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            session: SessionManager::new(),
            bridge,
            publisher,
            retry: RetryPolicy::new(&config.retry),
            settings: SchedulerSettings::from_config(config),
        }
    }

    /// Enqueue one inbound message as a job and start a drain loop if none
    /// is running. Callers pass a clone of the shared scheduler handle so
    /// the drain task can outlive them.
    pub async fn submit(self: Arc<Self>, sender: impl Into<String>, message: impl Into<String>) {
        let job = Job::new(sender, message);

        let start_drain = {
            let mut state = self.state.lock().await;
            state.queue.push_back(job);
            info!(pending = state.queue.len(), "job enqueued");
            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };

        self.publish_queue_status().await;

        if start_drain {
            tokio::spawn(self.drain());
        }
    }

    /// Run queued jobs to terminal completion, head first, until the queue
    /// is empty. The head is only removed after its attempt (including any
    /// authorized retry) reaches a terminal state.
    async fn drain(self: Arc<Self>) {
        loop {
            let job = {
                let mut state = self.state.lock().await;
                match state.queue.front() {
                    Some(job) => {
                        let job = job.clone();
                        state.active = true;
                        job
                    }
                    None => {
                        state.draining = false;
                        debug!("queue drained");
                        return;
                    }
                }
            };

            self.run_job(&job).await;

            {
                let mut state = self.state.lock().await;
                state.queue.pop_front();
                state.active = false;
                info!(pending = state.queue.len(), "job removed from queue");
            }
            self.publish_queue_status().await;
        }
    }

    /// Snapshot of the not-yet-dispatched jobs in enqueue order.
    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().await;
        let in_flight = usize::from(state.active);
        QueueSnapshot::from_jobs(state.queue.iter().skip(in_flight))
    }

    /// Re-publish the current queue snapshot to all consumers.
    pub async fn publish_queue_status(&self) {
        let snapshot = self.snapshot().await;
        self.publish(OutboundFrame::QueueStatus {
            count: snapshot.count,
            items: snapshot.items,
        })
        .await;
    }

    /// Discard the current worker session, returning the fresh one for
    /// acknowledgement.
    pub async fn reset_session(&self) -> Session {
        self.session.reset().await
    }

    /// Current worker session (fresh or resumable).
    pub async fn current_session(&self) -> Session {
        self.session.current().await
    }

    /// Last connected consumer went away: continuing the conversation has
    /// no audience, so the session starts over.
    pub async fn on_consumers_gone(&self) {
        info!("last consumer disconnected, resetting session");
        self.session.reset().await;
    }

    /// Deliver one frame, logging (not retrying) publish failures — the
    /// consumer channel is outside this core's responsibility.
    pub(super) async fn publish(&self, frame: OutboundFrame) {
        if let Err(err) = self.publisher.publish(frame).await {
            warn!(%err, "failed to publish frame");
        }
    }
}
