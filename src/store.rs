//! Entity stores.
//!
//! An [`EntityStore`] owns one collection (tasks or users), mirrors it to
//! the key-value store after every mutation and publishes the full
//! collection to subscribers.
//!
//! Persistence protocol:
//! - the collection is one JSON array under `E::COLLECTION_KEY`
//! - the id counter is a decimal string under `E::NEXT_ID_KEY`
//! - a missing or unreadable collection is replaced by the demo seed (or an
//!   empty collection when seeding is off) and written back
//! - a missing, unparsable or too-small counter is raised to `max(id) + 1`

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::entity::{Entity, EntityId};
use crate::error::{Error, Result};
use crate::storage::{lock_or_recover, read_json, write_json, KeyValueStore};
use crate::watch::{Broadcaster, Subscription};

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Seed demo records when nothing usable is stored
    pub seed_demo_data: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            seed_demo_data: true,
        }
    }
}

struct StoreState<E> {
    items: Vec<E>,
    next_id: EntityId,
    revision: u64,
}

impl<E: Entity> StoreState<E> {
    fn position(&self, id: EntityId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }
}

pub struct EntityStore<E: Entity> {
    kv: Arc<dyn KeyValueStore>,
    state: Mutex<StoreState<E>>,
    broadcaster: Broadcaster<Vec<E>>,
}

/// Smallest id that is safe to hand out next
fn derive_next_id<E: Entity>(items: &[E]) -> EntityId {
    items.iter().map(Entity::id).max().unwrap_or(0) + 1
}

impl<E: Entity> EntityStore<E> {
    /// Load the collection and counter from `kv`.
    ///
    /// Read failures of the underlying store are returned; unreadable JSON is
    /// treated as missing data.
    pub fn open(kv: Arc<dyn KeyValueStore>, options: StoreOptions) -> Result<Self> {
        let (items, reseeded) = match kv.get(E::COLLECTION_KEY)? {
            Some(raw) => match serde_json::from_str::<Vec<E>>(&raw) {
                Ok(items) => (items, false),
                Err(err) => {
                    warn!(kind = E::KIND, error = %err, "stored collection unreadable; reseeding");
                    (initial_items::<E>(options), true)
                }
            },
            None => (initial_items::<E>(options), true),
        };

        let derived = derive_next_id(&items);
        let stored: Option<EntityId> = match kv.get(E::NEXT_ID_KEY)? {
            Some(raw) => raw.trim().trim_matches('"').parse().ok(),
            None => None,
        };
        let next_id = stored.map_or(derived, |stored| stored.max(derived));

        if reseeded {
            if let Err(err) = write_json(kv.as_ref(), E::COLLECTION_KEY, &items) {
                error!(kind = E::KIND, error = %err, "failed to persist seeded collection");
            }
        }
        if stored != Some(next_id) {
            if let Err(err) = kv.set(E::NEXT_ID_KEY, &next_id.to_string()) {
                error!(kind = E::KIND, error = %err, "failed to persist next id");
            }
        }

        debug!(kind = E::KIND, count = items.len(), next_id, "store opened");
        Ok(Self {
            kv,
            broadcaster: Broadcaster::new(items.clone()),
            state: Mutex::new(StoreState {
                items,
                next_id,
                revision: 0,
            }),
        })
    }

    // =========================================================================
    // Reads and subscriptions
    // =========================================================================

    /// Snapshot of the whole collection
    pub fn all(&self) -> Vec<E> {
        lock_or_recover(&self.state).items.clone()
    }

    pub fn get(&self, id: EntityId) -> Option<E> {
        let state = lock_or_recover(&self.state);
        state.position(id).map(|index| state.items[index].clone())
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id the next `create` will use
    pub fn next_id(&self) -> EntityId {
        lock_or_recover(&self.state).next_id
    }

    /// Receive the current collection now and after every mutation.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[E]) + Send + Sync + 'static,
    {
        self.broadcaster.subscribe(move |items: &Vec<E>| callback(items))
    }

    /// Receive the record with `id` (or `None`) now and after every mutation.
    pub fn subscribe_by_id<F>(&self, id: EntityId, callback: F) -> Subscription
    where
        F: Fn(Option<&E>) + Send + Sync + 'static,
    {
        self.subscribe(move |items| callback(items.iter().find(|item| item.id() == id)))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Append a new record with the next id.
    ///
    /// If persisting fails the record stays in memory, subscribers are still
    /// notified, and the error is returned.
    pub fn create(&self, request: &E::Create) -> Result<E> {
        if let Some(message) = E::check_create(request) {
            return Err(Error::Validation(message));
        }

        let mut state = lock_or_recover(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        let record = E::from_create(id, request, Utc::now());
        state.items.push(record.clone());
        let persisted = self
            .persist_items(&state.items)
            .and_then(|()| self.persist_next_id(state.next_id));
        let (revision, snapshot) = bump(&mut state);
        drop(state);

        self.broadcaster.publish_revision(revision, snapshot);
        match persisted {
            Ok(()) => {
                debug!(kind = E::KIND, id, "created");
                Ok(record)
            }
            Err(err) => {
                error!(kind = E::KIND, id, error = %err, "create not persisted");
                Err(err)
            }
        }
    }

    /// Replace the record named by the request.
    ///
    /// `Ok(None)` when no such record exists; the collection is untouched.
    pub fn update(&self, request: &E::Update) -> Result<Option<E>> {
        if let Some(message) = E::check_update(request) {
            return Err(Error::Validation(message));
        }
        let id = E::update_id(request);
        self.modify(id, |record| record.apply_update(request, Utc::now()))
    }

    /// Remove a record.
    ///
    /// `Ok(false)` when the id is absent, when the record refuses deletion
    /// (a user holding a task), or when the new collection cannot be
    /// persisted; in all three cases nothing changes.
    pub fn delete(&self, id: EntityId) -> Result<bool> {
        let mut state = lock_or_recover(&self.state);
        let Some(index) = state.position(id) else {
            return Ok(false);
        };
        if let Some(reason) = state.items[index].delete_blocker() {
            warn!(kind = E::KIND, id, %reason, "delete refused");
            return Ok(false);
        }

        let mut remaining = state.items.clone();
        remaining.remove(index);
        if let Err(err) = self.persist_items(&remaining) {
            error!(kind = E::KIND, id, error = %err, "delete not persisted");
            return Ok(false);
        }
        state.items = remaining;
        let (revision, snapshot) = bump(&mut state);
        drop(state);

        self.broadcaster.publish_revision(revision, snapshot);
        debug!(kind = E::KIND, id, "deleted");
        Ok(true)
    }

    /// Replace the whole collection. The counter is raised to `max(id) + 1`
    /// when needed but never lowered, so earlier ids are not reused.
    pub fn import(&self, records: Vec<E>) -> Result<Vec<E>> {
        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = records.iter().find(|record| !seen.insert(record.id())) {
            return Err(Error::InvalidArgument(format!(
                "duplicate {} id {} in import",
                E::KIND,
                duplicate.id()
            )));
        }

        let mut state = lock_or_recover(&self.state);
        state.next_id = state.next_id.max(derive_next_id(&records));
        state.items = records.clone();
        let persisted = self
            .persist_items(&state.items)
            .and_then(|()| self.persist_next_id(state.next_id));
        let (revision, snapshot) = bump(&mut state);
        drop(state);

        self.broadcaster.publish_revision(revision, snapshot);
        if let Err(err) = persisted {
            error!(kind = E::KIND, error = %err, "import not persisted");
            return Err(err);
        }
        debug!(kind = E::KIND, count = records.len(), "imported");
        Ok(records)
    }

    /// Remove every record. The counter is kept so ids are not reused.
    ///
    /// `Ok(false)` when the empty collection cannot be persisted.
    pub fn clear(&self) -> Result<bool> {
        let mut state = lock_or_recover(&self.state);
        if let Err(err) = self.persist_items(&[]) {
            error!(kind = E::KIND, error = %err, "clear not persisted");
            return Ok(false);
        }
        state.items.clear();
        let (revision, snapshot) = bump(&mut state);
        drop(state);

        self.broadcaster.publish_revision(revision, snapshot);
        debug!(kind = E::KIND, "cleared");
        Ok(true)
    }

    /// Write the collection and counter again.
    pub fn flush(&self) -> Result<()> {
        let state = lock_or_recover(&self.state);
        self.persist_items(&state.items)?;
        self.persist_next_id(state.next_id)
    }

    /// Apply `mutate` to one record, refresh its modification stamp, persist
    /// and publish. `Ok(None)` when the id is absent.
    ///
    /// As with `create`, a persistence failure keeps the in-memory change.
    pub(crate) fn modify<F>(&self, id: EntityId, mutate: F) -> Result<Option<E>>
    where
        F: FnOnce(&mut E),
    {
        let mut state = lock_or_recover(&self.state);
        let Some(index) = state.position(id) else {
            return Ok(None);
        };
        let record = &mut state.items[index];
        mutate(record);
        record.touch(Utc::now());
        let updated = record.clone();
        let persisted = self.persist_items(&state.items);
        let (revision, snapshot) = bump(&mut state);
        drop(state);

        self.broadcaster.publish_revision(revision, snapshot);
        match persisted {
            Ok(()) => {
                debug!(kind = E::KIND, id, "updated");
                Ok(Some(updated))
            }
            Err(err) => {
                error!(kind = E::KIND, id, error = %err, "update not persisted");
                Err(err)
            }
        }
    }

    /// Put back an earlier copy of a record verbatim (no new stamp).
    pub(crate) fn restore(&self, record: E) -> Result<()> {
        let mut state = lock_or_recover(&self.state);
        let id = record.id();
        match state.position(id) {
            Some(index) => state.items[index] = record,
            None => state.items.push(record),
        }
        let persisted = self.persist_items(&state.items);
        let (revision, snapshot) = bump(&mut state);
        drop(state);

        self.broadcaster.publish_revision(revision, snapshot);
        persisted
    }

    fn persist_items(&self, items: &[E]) -> Result<()> {
        write_json(self.kv.as_ref(), E::COLLECTION_KEY, items)
    }

    fn persist_next_id(&self, next_id: EntityId) -> Result<()> {
        self.kv.set(E::NEXT_ID_KEY, &next_id.to_string())
    }

    /// Read what is currently persisted, bypassing memory.
    pub fn persisted(&self) -> Result<Option<Vec<E>>> {
        read_json(self.kv.as_ref(), E::COLLECTION_KEY)
    }
}

fn bump<E: Entity>(state: &mut StoreState<E>) -> (u64, Vec<E>) {
    state.revision += 1;
    (state.revision, state.items.clone())
}

fn initial_items<E: Entity>(options: StoreOptions) -> Vec<E> {
    if options.seed_demo_data {
        E::seed()
    } else {
        Vec::new()
    }
}

impl<E: Entity> std::fmt::Debug for EntityStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock_or_recover(&self.state);
        f.debug_struct("EntityStore")
            .field("kind", &E::KIND)
            .field("len", &state.items.len())
            .field("next_id", &state.next_id)
            .finish()
    }
}
