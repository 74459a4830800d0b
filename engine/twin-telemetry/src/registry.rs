//! Subscriber registry for snapshot fan-out

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::SubscriberError;
use crate::snapshot::Snapshot;

pub type SubscriberId = u64;

/// Callback invoked with every delivered snapshot
pub type SnapshotCallback = dyn Fn(Arc<Snapshot>) -> anyhow::Result<()> + Send + Sync;

/// A registered consumer
pub struct Subscriber {
    id: SubscriberId,
    callback: Box<SnapshotCallback>,
    active: AtomicBool,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// False once unsubscribed; queued snapshots are then discarded
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Invoke the callback, isolating errors and panics
    pub fn deliver(&self, snapshot: Arc<Snapshot>) -> Result<(), SubscriberError> {
        let tick = snapshot.tick;
        match catch_unwind(AssertUnwindSafe(|| (self.callback)(snapshot))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                Err(SubscriberError::Failed { id: self.id, tick, message: format!("{e:#}") })
            }
            Err(payload) => Err(SubscriberError::Panicked {
                id: self.id,
                tick,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).field("active", &self.is_active()).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Set of active subscribers.
///
/// Membership is copy-on-write: readers take a cheap `Arc` of the current list,
/// so subscribe/unsubscribe are safe at any time, including from inside a
/// delivery callback.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    members: RwLock<Arc<Vec<Arc<Subscriber>>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a callback; it receives snapshots from the next tick onwards
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> SubscriptionHandle
    where
        F: Fn(Arc<Snapshot>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let subscriber =
            Arc::new(Subscriber { id, callback: Box::new(callback), active: AtomicBool::new(true) });

        let mut members = self.members.write();
        let mut next = Vec::with_capacity(members.len() + 1);
        next.extend(members.iter().cloned());
        next.push(subscriber);
        *members = Arc::new(next);
        drop(members);

        tracing::debug!("Registered subscriber {}", id);
        SubscriptionHandle { id, registry: Arc::downgrade(self) }
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut members = self.members.write();
        let Some(position) = members.iter().position(|s| s.id == id) else {
            return false;
        };

        let mut next: Vec<Arc<Subscriber>> = members.as_ref().clone();
        let removed = next.remove(position);
        removed.active.store(false, Ordering::Release);
        *members = Arc::new(next);
        drop(members);

        tracing::debug!("Unregistered subscriber {}", id);
        true
    }

    /// Current members in registration order
    pub fn members(&self) -> Arc<Vec<Arc<Subscriber>>> {
        self.members.read().clone()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.members.read().iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry").field("members", &self.len()).finish()
    }
}

/// Returned by [`SubscriptionRegistry::subscribe`]. Owned by the caller;
/// dropping it does not unsubscribe.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriberId,
    registry: Weak<SubscriptionRegistry>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove this subscription. Returns false if it was already removed or
    /// the registry no longer exists.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.unsubscribe(self.id),
            None => false,
        }
    }
}
