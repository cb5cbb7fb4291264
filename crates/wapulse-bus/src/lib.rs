// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification bridge between the core components and connected clients.
//!
//! Every client connection subscribes under the observer id it represents
//! (the tenant id). [`EventBridge::notify`] fans an event out to every live
//! subscription of that observer with `try_send`: delivery is at-most-once,
//! a full queue drops the event, and closed subscriptions are pruned on the
//! next delivery attempt.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};
use wapulse_core::{Observer, ObserverEvent, ObserverId};

/// Per-subscription queue capacity used by [`EventBridge::default`].
pub const DEFAULT_CAPACITY: usize = 256;

/// Identifies one subscription of an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving side of a subscription.
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::Receiver<ObserverEvent>,
}

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::Sender<ObserverEvent>,
}

/// Fan-out of observer events to per-client queues.
pub struct EventBridge {
    subscribers: DashMap<ObserverId, Vec<Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBridge {
    /// `capacity` bounds each subscription's queue. Events for a full queue
    /// are dropped.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Registers a new subscription for `observer`.
    pub fn subscribe(&self, observer: ObserverId) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, events) = mpsc::channel(self.capacity);
        self.subscribers
            .entry(observer.clone())
            .or_default()
            .push(Subscriber { id, tx });
        debug!(observer = %observer, "observer subscribed");
        Subscription { id, events }
    }

    /// Removes one subscription. The observer entry goes away with its last subscription.
    pub fn unsubscribe(&self, observer: &ObserverId, id: SubscriptionId) {
        if let Some(mut subs) = self.subscribers.get_mut(observer) {
            subs.retain(|s| s.id != id);
        }
        self.subscribers.remove_if(observer, |_, subs| subs.is_empty());
    }

    /// Number of live subscriptions for `observer`.
    pub fn subscriber_count(&self, observer: &ObserverId) -> usize {
        self.subscribers
            .get(observer)
            .map(|subs| subs.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Observer for EventBridge {
    fn notify(&self, observer: &ObserverId, event: ObserverEvent) {
        let Some(mut subs) = self.subscribers.get_mut(observer) else {
            trace!(observer = %observer, ?event, "no subscriber, event dropped");
            return;
        };
        subs.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(observer = %observer, "subscriber queue full, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        let empty = subs.is_empty();
        drop(subs);
        if empty {
            self.subscribers.remove_if(observer, |_, subs| subs.is_empty());
        }
    }
}
