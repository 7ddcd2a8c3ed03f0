//! Synchronous publish/subscribe bus for federation events.
//!
//! `emit` delivers to every current subscriber, in subscription order, on the
//! caller's thread. The subscriber list is snapshotted before delivery, so a
//! subscriber added during (or after) an emission never sees that event, and
//! handlers may call back into the bus without deadlocking.
//!
//! Async consumers use [`EventBus::subscribe_channel`], which forwards events
//! best-effort into a bounded channel.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::core::events::FederationEvent;

/// Callback invoked for every emitted event.
pub type EventHandler = Arc<dyn Fn(&FederationEvent) + Send + Sync>;

/// Predicate deciding which events a channel subscriber receives.
pub type EventFilter = Arc<dyn Fn(&FederationEvent) -> bool + Send + Sync>;

/// Channel-based event sender (async, bounded).
pub type FederationEventTx = mpsc::Sender<Arc<FederationEvent>>;
/// Channel-based event receiver (async, bounded).
pub type FederationEventRx = mpsc::Receiver<Arc<FederationEvent>>;

/// Default capacity for channel subscriptions.
///
/// Text deltas are high-volume; slow consumers lose events rather than
/// stalling the emitting loop.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
enum Subscriber {
    Handler(EventHandler),
    Channel(FederationEventTx, Option<EventFilter>),
}

/// Process-wide event bus. No persistence, no backpressure, no retries.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers_len", &self.subscribers.lock().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler; it receives every event emitted from now on.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&FederationEvent) + Send + Sync + 'static,
    {
        self.push(Subscriber::Handler(Arc::new(handler)))
    }

    /// Registers a bounded channel subscriber and returns its receiver.
    ///
    /// Delivery is best-effort: an event is dropped for this subscriber when
    /// its channel is full. The subscription is removed automatically once
    /// the receiver is dropped.
    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriptionId, FederationEventRx) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.push(Subscriber::Channel(tx, None));
        (id, rx)
    }

    /// Like [`EventBus::subscribe_channel`], but only events accepted by
    /// `filter` take up channel capacity.
    pub fn subscribe_channel_filtered<F>(
        &self,
        capacity: usize,
        filter: F,
    ) -> (SubscriptionId, FederationEventRx)
    where
        F: Fn(&FederationEvent) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.push(Subscriber::Channel(tx, Some(Arc::new(filter))));
        (id, rx)
    }

    /// Removes a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Delivers `event` to every current subscriber.
    ///
    /// A panicking handler is logged and skipped; remaining subscribers still
    /// receive the event. Safe to call concurrently from any thread.
    pub fn emit(&self, event: FederationEvent) {
        let snapshot: Vec<(SubscriptionId, Subscriber)> = self.subscribers.lock().clone();
        if snapshot.is_empty() {
            return;
        }

        let event = Arc::new(event);
        let mut closed = Vec::new();

        for (id, subscriber) in snapshot {
            match subscriber {
                Subscriber::Handler(handler) => {
                    let delivered = panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
                    if delivered.is_err() {
                        warn!(event = %event.kind, ?id, "Event handler panicked; skipping it");
                    }
                }
                Subscriber::Channel(tx, filter) => {
                    if filter.is_some_and(|accept| !accept(&event)) {
                        if tx.is_closed() {
                            closed.push(id);
                        }
                        continue;
                    }
                    match tx.try_send(Arc::clone(&event)) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => closed.push(id),
                    }
                }
            }
        }

        if !closed.is_empty() {
            self.subscribers
                .lock()
                .retain(|(id, _)| !closed.contains(id));
        }
    }

    fn push(&self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, subscriber));
        id
    }
}
