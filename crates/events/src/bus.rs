//! In-process fan-out of decoded push frames.
//!
//! [`EventBus`] sits between the socket session and the local consumers
//! (notification reconciler, conversation synchronizer). It is designed
//! to be shared via `Arc<EventBus>`; each consumer holds its own
//! broadcast receiver.

use tokio::sync::broadcast;

use crate::protocol::PushFrame;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out hub for frames received on the push connection.
///
/// Delivery to local subscribers preserves the arrival order of frames,
/// which in turn preserves the server's per-channel order. A slow
/// subscriber can lag and lose frames; consumers treat a lag exactly
/// like a wire gap and re-fetch.
pub struct EventBus {
    sender: broadcast::Sender<PushFrame>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a decoded frame to all current subscribers.
    ///
    /// With zero subscribers the frame is silently dropped; the
    /// periodic reconciliation fetch covers whatever was missed.
    pub fn publish(&self, frame: PushFrame) {
        if self.sender.send(frame).is_err() {
            tracing::trace!("push frame dropped: no local subscribers");
        }
    }

    /// Subscribe to every frame published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<PushFrame> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
