//! WebSocket chat hub.
//!
//! Serves `/ws` for chat clients and `/health` for liveness probes. Every
//! client receives all outbound frames via the shared broadcast channel;
//! inbound text frames are chat messages (rebroadcast, then queued for the
//! worker unless sent by the agent identity itself) or admin commands
//! (`clear` resets the session, `status` re-publishes the queue snapshot).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::progress::OutboundFrame;
use crate::scheduler::queue::JobScheduler;
use crate::{AppError, Result};

/// Shared hub state handed to every connection handler.
#[derive(Clone)]
pub struct HubState {
    /// The serialized job scheduler.
    pub scheduler: Arc<JobScheduler>,
    /// Fan-out channel every client subscribes to.
    pub frames: broadcast::Sender<OutboundFrame>,
    /// Connected client count, for the last-disconnect session reset.
    pub clients: Arc<AtomicUsize>,
    /// Identity the worker posts under; its own messages are not queued.
    pub agent_name: String,
}

/// One frame on the consumer-facing inbound wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A chat message from a connected client.
    Message {
        /// Sending identity.
        #[serde(default = "default_username")]
        username: String,
        /// Message text.
        message: String,
    },
    /// An administrative command.
    Command {
        /// The command to run.
        command: CommandKind,
    },
}

/// Administrative commands accepted from clients.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Reset the worker session; acknowledged with the new identifier.
    Clear,
    /// Re-publish the current queue snapshot.
    Status,
}

fn default_username() -> String {
    "anonymous".into()
}

/// Build the hub router.
#[must_use]
pub fn router(state: HubState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the hub until the shutdown token fires.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve(
    state: HubState,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|err| AppError::Io(err.to_string()))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "agent-relay"
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<HubState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: HubState) {
    let connected = state.clients.fetch_add(1, Ordering::SeqCst) + 1;
    info!(clients = connected, "chat client connected");

    let (mut sink, mut stream) = socket.split();

    let hello = OutboundFrame::System {
        message: "connected to agent-relay".into(),
    };
    if send_frame(&mut sink, &hello).await.is_err() {
        finish_connection(&state).await;
        return;
    }

    // Forward every broadcast frame to this client until it goes away.
    let mut frames_rx = state.frames.subscribe();
    let forward = tokio::spawn(async move {
        loop {
            match frames_rx.recv().await {
                Ok(frame) => {
                    if send_frame(&mut sink, &frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "slow chat client lagged behind the frame stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(received) = stream.next().await {
        match received {
            Ok(Message::Text(text)) => handle_inbound(&state, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(%err, "websocket receive error");
                break;
            }
        }
    }

    forward.abort();
    finish_connection(&state).await;
}

/// Drop the client from the count; the last one out resets the session.
async fn finish_connection(state: &HubState) {
    let remaining = state.clients.fetch_sub(1, Ordering::SeqCst) - 1;
    info!(clients = remaining, "chat client disconnected");
    if remaining == 0 {
        state.scheduler.on_consumers_gone().await;
    }
}

async fn handle_inbound(state: &HubState, raw: &str) {
    let frame: InboundFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%err, "malformed inbound frame, ignoring");
            return;
        }
    };

    match frame {
        InboundFrame::Message { username, message } => {
            info!(username = %username, "chat message received");
            broadcast_frame(
                state,
                OutboundFrame::Message {
                    username: username.clone(),
                    message: message.clone(),
                },
            );
            if username != state.agent_name {
                Arc::clone(&state.scheduler).submit(username, message).await;
            }
        }
        InboundFrame::Command { command } => {
            info!(?command, "admin command received");
            match command {
                CommandKind::Clear => {
                    let fresh = state.scheduler.reset_session().await;
                    broadcast_frame(
                        state,
                        OutboundFrame::System {
                            message: format!("session reset (new session: {}…)", fresh.short_id()),
                        },
                    );
                }
                CommandKind::Status => state.scheduler.publish_queue_status().await,
            }
        }
    }
}

fn broadcast_frame(state: &HubState, frame: OutboundFrame) {
    if state.frames.send(frame).is_err() {
        debug!("no connected consumers, frame dropped");
    }
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &OutboundFrame,
) -> Result<()> {
    let json = serde_json::to_string(frame)
        .map_err(|err| AppError::Publish(format!("failed to serialize frame: {err}")))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|err| AppError::Publish(format!("failed to send frame: {err}")))
}
