//! Fan-out of change events to connected real-time observers.
//!
//! Each observer owns an unbounded delivery channel, so a slow consumer
//! buffers instead of blocking the publisher or its peers. Observers whose
//! channel has closed are pruned on the next publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::core::ChangeEvent;

pub type ObserverId = u64;

#[derive(Default)]
pub struct EventHub {
    observers: RwLock<HashMap<ObserverId, UnboundedSender<ChangeEvent>>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer and returns its handle plus the channel the
    /// caller drains. Dropping the receiver is an implicit unsubscribe,
    /// picked up lazily.
    pub async fn subscribe(&self) -> (ObserverId, UnboundedReceiver<ChangeEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.write().await.insert(id, tx);
        debug!(observer = id, "observer subscribed");
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: ObserverId) {
        if self.observers.write().await.remove(&id).is_some() {
            debug!(observer = id, "observer unsubscribed");
        }
    }

    /// Delivers `event` to every live observer. Sends never block; a closed
    /// observer is noted and removed after the iteration, without affecting
    /// delivery to the rest.
    pub async fn publish(&self, event: ChangeEvent) {
        let mut dead = Vec::new();
        {
            let observers = self.observers.read().await;
            for (id, sender) in observers.iter() {
                if sender.send(event.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut observers = self.observers.write().await;
            for id in dead {
                observers.remove(&id);
                debug!(observer = id, "pruned closed observer");
            }
        }
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PostView;
    use chrono::DateTime;
    use std::sync::Arc;

    // Fixed timestamp so two constructions of the same event compare equal.
    fn event(id: u64) -> ChangeEvent {
        ChangeEvent::Created(PostView {
            id,
            content: format!("post {id}"),
            created_at: DateTime::UNIX_EPOCH,
            name: "alice".to_string(),
        })
    }

    #[tokio::test]
    async fn publish_reaches_all_observers() {
        let hub = Arc::new(EventHub::new());
        let (_a, mut rx_a) = hub.subscribe().await;
        let (_b, mut rx_b) = hub.subscribe().await;

        hub.publish(event(1)).await;

        assert_eq!(rx_a.recv().await.unwrap(), event(1));
        assert_eq!(rx_b.recv().await.unwrap(), event(1));
    }

    #[tokio::test]
    async fn closed_observer_does_not_block_the_rest() {
        let hub = Arc::new(EventHub::new());
        let (_a, rx_a) = hub.subscribe().await;
        let (_b, mut rx_b) = hub.subscribe().await;
        let (_c, mut rx_c) = hub.subscribe().await;
        drop(rx_a);

        hub.publish(event(1)).await;

        assert_eq!(rx_b.recv().await.unwrap(), event(1));
        assert_eq!(rx_c.recv().await.unwrap(), event(1));
        assert_eq!(hub.observer_count().await, 2);
    }

    #[tokio::test]
    async fn delivery_order_matches_publish_order() {
        let hub = Arc::new(EventHub::new());
        let (_id, mut rx) = hub.subscribe().await;

        for n in 1..=5 {
            hub.publish(event(n)).await;
        }
        for n in 1..=5 {
            assert_eq!(rx.recv().await.unwrap(), event(n));
        }
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = Arc::new(EventHub::new());
        let (id, mut rx) = hub.subscribe().await;

        hub.unsubscribe(id).await;
        hub.publish(event(1)).await;

        assert!(rx.recv().await.is_none());
        assert_eq!(hub.observer_count().await, 0);
    }
}
