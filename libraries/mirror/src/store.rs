//! # CollectionStore
//! An in-memory index of records grouped by an owner key, mirrored against one remote collection.
//!
//! Local mutations are optimistic: the index changes synchronously, the remote write is spawned and forgotten.
//! While connected, every snapshot from the remote replaces the index wholesale. Every change is saved to the
//! store's cache slot and announced to listeners once no borrow of the store is held.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    rc::{Rc, Weak},
};

use futures::task::{LocalSpawn, LocalSpawnExt as _};
use serde_json::{Map, Value};

use crate::{
    Record,
    auth::AuthProvider,
    cache::{self, CacheSlots},
    listeners::{ListenerKey, Listeners, notify_all},
    remote::{
        CollectionPath, OrderBy, Query, Remote, RemoteError, RemoteFuture, Snapshot,
        Subscription, to_document_data,
    },
};

/// The in-memory index: owner key to records, in display order.
pub type Index<R> = BTreeMap<String, Vec<R>>;

/// Everything a store talks to besides its own state.
#[derive(Clone)]
pub struct Services {
    pub remote: Rc<dyn Remote>,
    pub cache: Rc<dyn CacheSlots>,
    pub auth: Rc<dyn AuthProvider>,
    pub spawner: Rc<dyn LocalSpawn>,
}

/// Static description of one mirrored collection.
#[derive(Clone, Debug)]
pub struct CollectionSpec {
    /// Used as log prefix.
    pub name: &'static str,
    pub collection: CollectionPath,
    pub order: OrderBy,
    pub cache_key: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Something that holds a live remote binding which can be turned on and off.
pub trait LiveBinding {
    fn connect(&self);

    fn disconnect(&self);

    fn connection_state(&self) -> ConnectionState;
}

/// Lifecycle of a live query held by a binding.
#[derive(Debug, Default)]
pub enum Connection {
    #[default]
    Disconnected,
    // between issuing the query and receiving its handle
    Connecting,
    Connected(Subscription),
}

impl Connection {
    pub fn state(&self) -> ConnectionState {
        match self {
            Connection::Disconnected => ConnectionState::Disconnected,
            Connection::Connecting | Connection::Connected(_) => ConnectionState::Connected,
        }
    }
}

struct StoreState<R> {
    index: Index<R>,
    connection: Connection,
    listeners: Listeners,
    dirty: bool,
}

struct Shared<R> {
    spec: CollectionSpec,
    services: Services,
    state: RefCell<StoreState<R>>,
}

pub struct CollectionStore<R> {
    shared: Rc<Shared<R>>,
}

impl<R> Clone for CollectionStore<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

/// Flushes pending change notifications when dropped, so listeners never run inside a borrow.
struct FlushLater<'a, R: Record> {
    store: &'a CollectionStore<R>,
}

impl<'a, R: Record> FlushLater<'a, R> {
    fn new(store: &'a CollectionStore<R>) -> Self {
        Self { store }
    }
}

impl<R: Record> Drop for FlushLater<'_, R> {
    fn drop(&mut self) {
        self.store.flush_notifications();
    }
}

impl<R: Record> CollectionStore<R> {
    /// Create a store, starting from whatever its cache slot holds.
    pub fn new(spec: CollectionSpec, services: Services) -> Self {
        let index: Index<R> = cache::load(&*services.cache, spec.cache_key, Index::new());
        Self {
            shared: Rc::new(Shared {
                spec,
                services,
                state: RefCell::new(StoreState {
                    index,
                    connection: Connection::Disconnected,
                    listeners: Listeners::new(),
                    dirty: false,
                }),
            }),
        }
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.shared.spec
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerKey {
        self.shared
            .state
            .borrow_mut()
            .listeners
            .insert(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.shared.state.borrow_mut().listeners.remove(key);
    }

    // =======
    // Reads

    /// Records under `key`, in display order. Unknown keys are empty, not errors.
    pub fn list(&self, key: &str) -> Vec<R> {
        self.shared
            .state
            .borrow()
            .index
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn find(&self, key: &str, id: &str) -> Option<R> {
        self.shared
            .state
            .borrow()
            .index
            .get(key)
            .and_then(|records| records.iter().find(|record| record.id() == id))
            .cloned()
    }

    /// Keys currently present in the index.
    pub fn keys(&self) -> Vec<String> {
        self.shared.state.borrow().index.keys().cloned().collect()
    }

    pub fn index(&self) -> Index<R> {
        self.shared.state.borrow().index.clone()
    }

    // =======
    // Optimistic mutations

    /// Make sure `key` has a (possibly empty) list.
    pub fn ensure_key(&self, key: &str) {
        let _flusher = FlushLater::new(self);
        let mut state = self.shared.state.borrow_mut();
        if !state.index.contains_key(key) {
            state.index.insert(key.to_string(), Vec::new());
            state.dirty = true;
        }
    }

    /// Prepend `record` to its owner's list and write it to the remote collection. Returns the record id.
    pub fn insert(&self, record: R) -> String {
        let _flusher = FlushLater::new(self);
        let id = record.id().to_string();

        let write = to_document_data(&record).map(|data| {
            self.shared
                .services
                .remote
                .set_document(&self.shared.spec.collection, &id, data)
        });

        {
            let mut state = self.shared.state.borrow_mut();
            state
                .index
                .entry(record.index_key().to_string())
                .or_default()
                .insert(0, record);
            state.dirty = true;
        }

        match write {
            Ok(write) => self.spawn_write("create", write),
            Err(e) => log::error!("[{}] create failed: {e}", self.shared.spec.name),
        }
        id
    }

    /// Edit the record `id` under `key` in place.
    ///
    /// `edit` returns the names of the top-level fields it changed, or `None` to leave the record alone. Those fields
    /// are then patched remotely with their new local values. Returns whether the record was changed.
    pub fn modify(
        &self,
        key: &str,
        id: &str,
        edit: impl FnOnce(&mut R) -> Option<Vec<&'static str>>,
    ) -> bool {
        let _flusher = FlushLater::new(self);

        let fields = {
            let mut state = self.shared.state.borrow_mut();
            let Some(record) = state
                .index
                .get_mut(key)
                .and_then(|records| records.iter_mut().find(|record| record.id() == id))
            else {
                return false;
            };

            let Some(changed) = edit(record) else {
                return false;
            };

            let fields = to_document_data(&*record).map(|data| pick_fields(data, &changed));
            state.dirty = true;
            fields
        };

        match fields {
            Ok(fields) if fields.is_empty() => {}
            Ok(fields) => {
                let write = self.shared.services.remote.update_document(
                    &self.shared.spec.collection,
                    id,
                    fields,
                );
                self.spawn_write("update", write);
            }
            Err(e) => log::error!("[{}] update failed: {e}", self.shared.spec.name),
        }
        true
    }

    /// Drop the record `id` from `key`'s list and delete it remotely.
    pub fn remove(&self, key: &str, id: &str) {
        let _flusher = FlushLater::new(self);
        {
            let mut state = self.shared.state.borrow_mut();
            let records = state.index.entry(key.to_string()).or_default();
            records.retain(|record| record.id() != id);
            state.dirty = true;
        }

        let write = self
            .shared
            .services
            .remote
            .delete_document(&self.shared.spec.collection, id);
        self.spawn_write("delete", write);
    }

    // =======
    // Remote view

    /// Replace the whole index with the contents of `snapshot`, grouped by owner key in snapshot order.
    pub fn apply_snapshot(&self, snapshot: Snapshot) {
        let _flusher = FlushLater::new(self);

        let mut rebuilt = Index::<R>::new();
        for document in &snapshot.documents {
            match R::from_document(document) {
                Ok(record) => rebuilt
                    .entry(record.index_key().to_string())
                    .or_default()
                    .push(record),
                Err(e) => log::warn!(
                    "[{}] skipping undecodable document {}: {e}",
                    self.shared.spec.name,
                    document.id
                ),
            }
        }

        let mut state = self.shared.state.borrow_mut();
        state.index = rebuilt;
        state.dirty = true;
    }

    fn on_remote_error(&self, error: RemoteError) {
        if error.is_permission_denied() {
            log::warn!(
                "[{}] live query denied, disconnecting: {error}",
                self.shared.spec.name
            );
            self.disconnect();
        } else {
            log::error!("[{}] live query error: {error}", self.shared.spec.name);
        }
    }

    fn spawn_write(&self, operation: &'static str, write: RemoteFuture) {
        let name = self.shared.spec.name;
        let task = async move {
            if let Err(e) = write.await {
                log::error!("[{name}] {operation} failed: {e}");
            }
        };
        if let Err(e) = self.shared.services.spawner.spawn_local(task) {
            log::error!("[{name}] could not spawn {operation}: {e}");
        }
    }

    /// Save and notify if anything changed since the last flush.
    fn flush_notifications(&self) {
        let listeners = {
            let mut state = self.shared.state.borrow_mut();
            if !std::mem::take(&mut state.dirty) {
                return;
            }
            cache::save(
                &*self.shared.services.cache,
                self.shared.spec.cache_key,
                &state.index,
            );
            state.listeners.pending_calls()
        };
        // listeners commonly read the store again, so they must run without the borrow
        notify_all(listeners);
    }

    fn downgrade(&self) -> Weak<Shared<R>> {
        Rc::downgrade(&self.shared)
    }

    fn upgrade(shared: &Weak<Shared<R>>) -> Option<Self> {
        shared.upgrade().map(|shared| Self { shared })
    }
}

impl<R: Record> LiveBinding for CollectionStore<R> {
    /// Start the live query. Does nothing when already connected or when nobody is signed in.
    fn connect(&self) {
        {
            let mut state = self.shared.state.borrow_mut();
            if !matches!(state.connection, Connection::Disconnected) {
                return;
            }
            if self.shared.services.auth.current_user().is_none() {
                return;
            }
            state.connection = Connection::Connecting;
        }

        let query = Query {
            collection: self.shared.spec.collection.clone(),
            order: Some(self.shared.spec.order.clone()),
        };
        let weak = self.downgrade();
        let subscription = self.shared.services.remote.subscribe(
            query,
            Box::new(move |result| {
                let Some(store) = Self::upgrade(&weak) else {
                    return;
                };
                match result {
                    Ok(snapshot) => store.apply_snapshot(snapshot),
                    Err(error) => store.on_remote_error(error),
                }
            }),
        );

        let mut state = self.shared.state.borrow_mut();
        if matches!(state.connection, Connection::Connecting) {
            state.connection = Connection::Connected(subscription);
            log::info!("[{}] connected", self.shared.spec.name);
        } else {
            // disconnected while the query was being issued
            drop(state);
            subscription.cancel();
        }
    }

    /// Drop the live query, if any. Idempotent.
    fn disconnect(&self) {
        let previous = std::mem::replace(
            &mut self.shared.state.borrow_mut().connection,
            Connection::Disconnected,
        );
        if let Connection::Connected(subscription) = previous {
            subscription.cancel();
            log::info!("[{}] disconnected", self.shared.spec.name);
        }
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.state.borrow().connection.state()
    }
}

fn pick_fields(mut data: Map<String, Value>, fields: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|field| data.remove(*field).map(|value| (field.to_string(), value)))
        .collect()
}
