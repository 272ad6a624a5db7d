//! Broadcast hub implementing the [`Notifier`] seam.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use badgetrack_core::Notifier;

/// Event delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Monotonic per-hub sequence number, starting at 1.
    pub sequence: u64,
    pub event: String,
    pub payload: Value,
}

/// Fan-out hub over a `tokio::sync::broadcast` channel.
pub struct EventHub {
    event_tx: broadcast::Sender<Notification>,
    sequence: AtomicU64,
}

impl EventHub {
    /// Create a hub buffering up to `capacity` events per observer.
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            event_tx,
            sequence: AtomicU64::new(0),
        }
    }

    /// Register a new observer. It sees only events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        let rx = self.event_tx.subscribe();
        debug!(observers = self.event_tx.receiver_count(), "Observer subscribed");
        rx
    }

    /// Number of currently connected observers.
    pub fn observer_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    /// Number of events broadcast so far.
    pub fn sent(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl Notifier for EventHub {
    fn broadcast(&self, event: &str, payload: Value) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let notification = Notification {
            sequence,
            event: event.to_string(),
            payload,
        };
        match self.event_tx.send(notification) {
            Ok(observers) => trace!(event, sequence, observers, "Event broadcast"),
            Err(_) => trace!(event, sequence, "No observers for event"),
        }
    }
}
