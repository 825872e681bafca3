//! Progress publishing seam between the scheduler and its consumers.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::progress::OutboundFrame;
use crate::Result;

/// Receives typed progress/result frames and fans them out to connected
/// consumers. The scheduler only ever talks to this trait; the transport
/// behind it is a collaborator, not part of the core.
pub trait ProgressPublisher: Send + Sync {
    /// Deliver one frame to all current consumers.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Publish`](crate::AppError::Publish) if the frame
    /// could not be handed to the transport.
    fn publish(
        &self,
        frame: OutboundFrame,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Publisher backed by the hub's broadcast channel.
///
/// Every connected WebSocket client holds a subscription; a frame sent
/// while nobody is connected is dropped quietly, which is the desired
/// behavior for progress noise.
#[derive(Debug, Clone)]
pub struct HubPublisher {
    frames: broadcast::Sender<OutboundFrame>,
}

impl HubPublisher {
    /// Wrap the hub's broadcast sender.
    #[must_use]
    pub fn new(frames: broadcast::Sender<OutboundFrame>) -> Self {
        Self { frames }
    }
}

impl ProgressPublisher for HubPublisher {
    fn publish(
        &self,
        frame: OutboundFrame,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.frames.send(frame).is_err() {
                debug!("no connected consumers, frame dropped");
            }
            Ok(())
        })
    }
}
