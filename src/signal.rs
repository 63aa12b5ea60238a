use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::cache::Snapshot;

/// Notification from the hub to zone/DHW entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The cache holds a confirmed snapshot; recompute and clear any provisional state.
    Update,
    /// The cache was optimistically mutated; recompute but treat the result as provisional.
    Assume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub(crate) type SignalCallback = Arc<dyn Fn(Signal, &Snapshot) + Send + Sync>;

/// Synchronous in-process broadcast. Each publication calls every subscriber once,
/// on the publishing thread, before `publish` returns.
#[derive(Default)]
pub struct SignalBus {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, SignalCallback)>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, f: impl Fn(Signal, &Snapshot) + Send + Sync + 'static) -> SubscriptionId {
        self.subscribe_arc(Arc::new(f))
    }

    pub(crate) fn subscribe_arc(&self, f: SignalCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, f));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn publish(&self, signal: Signal, snapshot: &Snapshot) {
        // callbacks run outside the lock so they may (un)subscribe
        let targets: Vec<SignalCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        trace!(?signal, subscribers = targets.len(), "publishing");
        for f in targets {
            f(signal, snapshot);
        }
    }
}
