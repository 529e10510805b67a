//! Publish/subscribe over the latest value of a collection.
//!
//! A [`Broadcaster`] remembers the last published value. Subscribers get
//! that value immediately on subscribe and every later publish, until the
//! returned [`Subscription`] is explicitly unsubscribed. Dropping the handle
//! does not stop delivery.

use std::sync::{Arc, Mutex, Weak};

use crate::storage::lock_or_recover;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    latest: Arc<T>,
    revision: u64,
    next_id: u64,
    subscribers: Vec<(u64, Callback<T>)>,
}

pub struct Broadcaster<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: Send + Sync + 'static> Broadcaster<T> {
    pub fn new(initial: T) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                latest: Arc::new(initial),
                revision: 0,
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Register `callback` and deliver the latest value to it right away.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(callback);
        let (id, latest) = {
            let mut registry = lock_or_recover(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.subscribers.push((id, Arc::clone(&callback)));
            (id, Arc::clone(&registry.latest))
        };
        callback(&latest);

        let registry: Arc<Mutex<dyn Unsubscribe + Send>> = self.registry.clone();
        Subscription {
            id,
            registry: Arc::downgrade(&registry),
        }
    }

    /// Replace the latest value and notify every active subscriber.
    ///
    /// Callbacks run without the registry lock held, so they may subscribe,
    /// unsubscribe or publish.
    pub fn publish(&self, value: T) {
        let revision = lock_or_recover(&self.registry).revision + 1;
        self.publish_revision(revision, value);
    }

    /// Like [`publish`](Self::publish), but drops `value` when a value with
    /// an equal or newer revision has already been published.
    ///
    /// Returns whether the value was delivered.
    pub fn publish_revision(&self, revision: u64, value: T) -> bool {
        let (latest, subscribers) = {
            let mut registry = lock_or_recover(&self.registry);
            if revision <= registry.revision {
                return false;
            }
            registry.revision = revision;
            registry.latest = Arc::new(value);
            let subscribers: Vec<Callback<T>> = registry
                .subscribers
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect();
            (Arc::clone(&registry.latest), subscribers)
        };
        for callback in subscribers {
            callback(&latest);
        }
        true
    }

    /// The last published value
    pub fn latest(&self) -> Arc<T> {
        Arc::clone(&lock_or_recover(&self.registry).latest)
    }

    pub fn subscriber_count(&self) -> usize {
        lock_or_recover(&self.registry).subscribers.len()
    }
}

trait Unsubscribe {
    fn unsubscribe(&mut self, id: u64) -> bool;
    fn contains(&self, id: u64) -> bool;
}

impl<T> Unsubscribe for Registry<T> {
    fn unsubscribe(&mut self, id: u64) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    fn contains(&self, id: u64) -> bool {
        self.subscribers.iter().any(|(existing, _)| *existing == id)
    }
}

/// Handle to an active subscription
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<dyn Unsubscribe + Send>>,
}

impl Subscription {
    /// Stop delivery. Returns `false` if it was already stopped or the
    /// broadcaster is gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => lock_or_recover(&registry).unsubscribe(self.id),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| lock_or_recover(&registry).contains(self.id))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
