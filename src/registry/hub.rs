//! Snapshot fan-out to observers
//!
//! Any number of observers can watch one entry. Each callback is invoked
//! outside the hub's lock, so a callback may subscribe, unsubscribe or read
//! the entry without deadlocking. A panicking callback is logged and skipped.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::registry::key::StreamKey;
use crate::session::state::ConnectionSnapshot;

type Callback = Arc<dyn Fn(&ConnectionSnapshot) + Send + Sync>;

struct Subscriber {
    callback: Callback,
    /// Highest snapshot version delivered to this subscriber
    delivered: Arc<AtomicU64>,
}

struct HubInner {
    current: ConnectionSnapshot,
    version: u64,
    next_id: u64,
    subscribers: BTreeMap<u64, Subscriber>,
}

/// Broadcasts connection snapshots to callbacks and watchers
pub struct SubscriptionHub {
    key: StreamKey,
    inner: Mutex<HubInner>,
    watch_tx: watch::Sender<ConnectionSnapshot>,
}

impl SubscriptionHub {
    pub fn new(key: StreamKey) -> Arc<Self> {
        let (watch_tx, _) = watch::channel(ConnectionSnapshot::default());
        Arc::new(Self {
            key,
            inner: Mutex::new(HubInner {
                current: ConnectionSnapshot::default(),
                version: 1,
                next_id: 0,
                subscribers: BTreeMap::new(),
            }),
            watch_tx,
        })
    }

    /// Register a callback. The current snapshot is delivered before this returns.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&ConnectionSnapshot) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let delivered = Arc::new(AtomicU64::new(0));

        let (id, snapshot, version) = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.insert(
                id,
                Subscriber {
                    callback: callback.clone(),
                    delivered: delivered.clone(),
                },
            );
            (id, inner.current.clone(), inner.version)
        };

        self.deliver(&callback, &delivered, &snapshot, version);

        tracing::debug!(stream = %self.key, subscriber = id, "Subscriber added");

        Subscription {
            hub: Arc::downgrade(self),
            id: Some(id),
        }
    }

    /// Receiver that always holds the latest snapshot
    pub fn watch(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.watch_tx.subscribe()
    }

    /// Publish a snapshot. Identical consecutive snapshots are not re-sent.
    pub fn publish(&self, snapshot: ConnectionSnapshot) {
        let (targets, version) = {
            let mut inner = self.inner.lock();
            if inner.current == snapshot {
                return;
            }
            inner.current = snapshot.clone();
            inner.version += 1;

            let targets: Vec<(Callback, Arc<AtomicU64>)> = inner
                .subscribers
                .values()
                .map(|s| (s.callback.clone(), s.delivered.clone()))
                .collect();
            (targets, inner.version)
        };

        self.watch_tx.send_replace(snapshot.clone());

        for (callback, delivered) in &targets {
            self.deliver(callback, delivered, &snapshot, version);
        }
    }

    /// Latest published snapshot
    pub fn current(&self) -> ConnectionSnapshot {
        self.inner.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    fn unsubscribe(&self, id: u64) {
        if self.inner.lock().subscribers.remove(&id).is_some() {
            tracing::debug!(stream = %self.key, subscriber = id, "Subscriber removed");
        }
    }

    fn deliver(
        &self,
        callback: &Callback,
        delivered: &AtomicU64,
        snapshot: &ConnectionSnapshot,
        version: u64,
    ) {
        // A newer snapshot already reached this subscriber
        if delivered.fetch_max(version, Ordering::AcqRel) >= version {
            return;
        }

        if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
            tracing::warn!(
                stream = %self.key,
                state = %snapshot.state,
                "Subscriber callback panicked"
            );
        }
    }
}

/// Guard returned by `subscribe`. Dropping it unsubscribes.
pub struct Subscription {
    hub: Weak<SubscriptionHub>,
    id: Option<u64>,
}

impl Subscription {
    /// Stop receiving snapshots
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let (Some(id), Some(hub)) = (self.id.take(), self.hub.upgrade()) {
            hub.unsubscribe(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
