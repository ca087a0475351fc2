//! Fan-out event broadcasting for the tunnelsync engines.
//!
//! Both engines publish change events to an arbitrary number of
//! independent subscribers. Each subscription starts from "now" (no
//! history replay) and receives events in production order. Buffering
//! is per-subscriber with a bounded capacity: a subscriber that falls
//! behind skips the dropped prefix and keeps receiving the newest
//! events, so slow consumers never stall the producer.

use tokio::sync::broadcast;
use tracing::debug;

/// Default per-subscriber buffer capacity.
pub const DEFAULT_CAPACITY: usize = 64;

/// A multi-subscriber event channel.
///
/// Cloning the bus is cheap and yields a handle to the same channel.
#[derive(Debug, Clone)]
pub struct EventBus<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    /// Creates a bus with the default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus with an explicit per-subscriber buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// An event published while no subscriber exists is dropped.
    pub fn send(&self, event: T) {
        // send only fails when there are no receivers
        let _ = self.sender.send(event);
    }

    /// Opens an independent subscription starting from now.
    pub fn subscribe(&self) -> EventSubscription<T> {
        EventSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of an [`EventBus`].
#[derive(Debug)]
pub struct EventSubscription<T> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> EventSubscription<T> {
    /// Receives the next event.
    ///
    /// Returns `None` once the bus has been dropped and all buffered
    /// events were consumed. If this subscriber lagged behind the
    /// buffer capacity, the dropped prefix is skipped and the next
    /// buffered event is returned.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged, skipping to newest events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Converts the subscription into a `futures::Stream` of events.
    pub fn into_stream(self) -> impl futures::Stream<Item = T> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}
