//! Domain event fan-out.
//!
//! Events are pushed to live subscribers over a broadcast channel; state
//! remains the source of truth, so a send with no receivers is not an
//! error.

use tokio::sync::broadcast;

/// Events emitted by the state owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// A goal's map was (re)built and committed.
    MapReady { goal: String },
    /// A pipeline run failed; the previous map (if any) was retained.
    MapFailed { goal: String, error: String },
    BoardRefreshed,
    /// One or more lines completed with a single toggle.
    LineCompleted { count: usize },
    BoardCompleted,
}

/// In-process broadcast bus for [`AppEvent`].
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to all active subscribers. "No receiver" is silently fine.
    pub fn publish(&self, event: AppEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
