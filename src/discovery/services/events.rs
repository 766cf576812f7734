//! Typed broadcast channel owned by each discovery component.

use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast channel for one component's typed events.
///
/// Consumers subscribe explicitly. Emitting with no subscribers is not an
/// error, and slow subscribers observe `Lagged` rather than blocking the
/// emitter.
#[derive(Debug)]
pub struct EventChannel<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventChannel<E> {
    /// Creates a channel buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Emits an event to every current subscriber.
    pub fn emit(&self, event: E) {
        if self.sender.send(event).is_err() {
            trace!("event emitted without subscribers");
        }
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
