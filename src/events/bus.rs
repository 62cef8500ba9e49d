//! Publish/subscribe fan-out for engine events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::warn;

use super::stream::Subscription;
use super::types::{EngineEvent, EventFilter, SubscriptionId};

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    tx: Sender<EngineEvent>,
}

#[derive(Debug, Default)]
pub(crate) struct BusInner {
    subscribers: Mutex<Vec<Subscriber>>,
    dropped_events: AtomicU64,
}

impl BusInner {
    pub(crate) fn remove(&self, id: SubscriptionId) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|s| s.id != id);
        }
    }
}

/// Fans each published event out to every matching subscriber.
///
/// Publishing never blocks: a subscriber whose buffer is full misses the
/// event and the drop is counted.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
    capacity: usize,
}

impl EventBus {
    /// `capacity` bounds each subscriber's buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Register a subscriber.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let id = SubscriptionId::new();
        let (tx, rx) = bounded(self.capacity);
        match self.inner.subscribers.lock() {
            Ok(mut subs) => subs.push(Subscriber { id, filter, tx }),
            // The receiver reports disconnect once `tx` is dropped.
            Err(_) => warn!(subscription_id = %id, "event bus lock poisoned; subscription is closed"),
        }
        Subscription::new(id, rx, Arc::downgrade(&self.inner))
    }

    /// Deliver `event` to every matching subscriber.
    pub fn publish(&self, event: &EngineEvent) {
        let Ok(mut subs) = self.inner.subscribers.lock() else {
            self.inner.dropped_events.fetch_add(1, Ordering::Relaxed);
            return;
        };
        subs.retain(|sub| {
            if !sub.filter.matches(event) {
                return true;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped_events.fetch_add(1, Ordering::Relaxed);
                    warn!(subscription_id = %sub.id, kind = ?event.kind(), "subscriber buffer full; event dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Events that could not be delivered to some subscriber.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped_events.load(Ordering::Relaxed)
    }
}
