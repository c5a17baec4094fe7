//! Supervisor event fan-out.

use llamactl_core::SupervisorEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcaster for supervisor events.
///
/// Events sent with no subscribers are dropped. Slow subscribers see
/// `RecvError::Lagged` rather than blocking the sender.
#[derive(Debug)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SupervisorEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast(&self, event: SupervisorEvent) {
        if self.sender.receiver_count() > 0 {
            trace!(?event, "Broadcasting supervisor event");
            let _ = self.sender.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
