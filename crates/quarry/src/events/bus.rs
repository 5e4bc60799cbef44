//! Event bus — pub/sub over a Tokio broadcast channel.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::QuarryEvent;

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to an EventBus.
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast bus the engine and its monitors publish on.
pub struct EventBus {
    sender: broadcast::Sender<QuarryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish to all subscribers; having no subscribers is not an error.
    pub fn publish(&self, event: QuarryEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "event published"),
            Err(_) => debug!(event_type, "event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuarryEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
