//! An in-process [`Remote`]. Used by tests and by hosts that run without a backend.
//!
//! Writes are applied when their future is polled, after which every live query on the written collection gets a
//! fresh snapshot. A new subscription receives its first snapshot on the next [`MemoryRemote::flush`] or write.

use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    rc::{Rc, Weak},
};

use futures::FutureExt as _;
use serde_json::{Map, Value};
use slotmap::SlotMap;

use crate::remote::{
    CollectionPath, Direction, Document, Query, Remote, RemoteError, RemoteErrorKind,
    RemoteFuture, Snapshot, SnapshotCallback, Subscription, is_server_timestamp,
};

slotmap::new_key_type! { struct WatchKey; }

struct Watch {
    query: Query,
    callback: Rc<RefCell<SnapshotCallback>>,
}

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<CollectionPath, BTreeMap<String, Map<String, Value>>>,
    watches: SlotMap<WatchKey, Watch>,
    pending: BTreeSet<WatchKey>,
    denied_reads: BTreeSet<CollectionPath>,
    write_failure: Option<RemoteError>,
    writes_applied: usize,
}

#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver initial snapshots to subscriptions that have not received one yet.
    pub fn flush(&self) {
        let pending = std::mem::take(&mut self.state.borrow_mut().pending);
        Self::deliver(&self.state, pending);
    }

    /// Make every following write fail with `error`, or succeed again with `None`.
    pub fn fail_writes(&self, error: Option<RemoteError>) {
        self.state.borrow_mut().write_failure = error;
    }

    /// Live queries on `collection` get permission errors instead of snapshots.
    pub fn deny_reads(&self, collection: &CollectionPath) {
        self.state
            .borrow_mut()
            .denied_reads
            .insert(collection.clone());
    }

    /// Undo `deny_reads`. Queries already refused stay refused.
    pub fn allow_reads(&self, collection: &CollectionPath) {
        self.state.borrow_mut().denied_reads.remove(collection);
    }

    /// Push an error to every live query on `collection`.
    pub fn emit_error(&self, collection: &CollectionPath, error: RemoteError) {
        let callbacks = self
            .state
            .borrow()
            .watches
            .values()
            .filter(|watch| &watch.query.collection == collection)
            .map(|watch| Rc::clone(&watch.callback))
            .collect::<Vec<_>>();
        for callback in callbacks {
            (callback.borrow_mut())(Err(error.clone()));
        }
    }

    /// Replace a whole collection out of band, as another client would, and notify live queries.
    pub fn replace_collection(&self, collection: &CollectionPath, documents: Vec<Document>) {
        self.state.borrow_mut().collections.insert(
            collection.clone(),
            documents
                .into_iter()
                .map(|document| (document.id, document.data))
                .collect(),
        );
        Self::notify_collection(&self.state, collection);
    }

    pub fn document(&self, collection: &CollectionPath, id: &str) -> Option<Map<String, Value>> {
        self.state
            .borrow()
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    pub fn document_count(&self, collection: &CollectionPath) -> usize {
        self.state
            .borrow()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state.borrow().watches.len()
    }

    /// Number of writes that reached storage.
    pub fn writes_applied(&self) -> usize {
        self.state.borrow().writes_applied
    }

    fn write<F>(&self, collection: &CollectionPath, apply: F) -> RemoteFuture
    where
        F: FnOnce(&mut BTreeMap<String, Map<String, Value>>) -> Result<(), RemoteError> + 'static,
    {
        let state = Rc::clone(&self.state);
        let collection = collection.clone();
        async move {
            {
                let mut state = state.borrow_mut();
                if let Some(error) = state.write_failure.clone() {
                    return Err(error);
                }
                apply(state.collections.entry(collection.clone()).or_default())?;
                state.writes_applied += 1;
            }
            Self::notify_collection(&state, &collection);
            Ok(())
        }
        .boxed_local()
    }

    fn notify_collection(state: &Rc<RefCell<MemoryState>>, collection: &CollectionPath) {
        let keys = {
            let mut state = state.borrow_mut();
            let keys = state
                .watches
                .iter()
                .filter(|(_, watch)| &watch.query.collection == collection)
                .map(|(key, _)| key)
                .collect::<BTreeSet<_>>();
            // a write counts as the first delivery too
            for key in &keys {
                state.pending.remove(key);
            }
            keys
        };
        Self::deliver(state, keys);
    }

    fn deliver(state: &Rc<RefCell<MemoryState>>, keys: BTreeSet<WatchKey>) {
        let deliveries = {
            let state = state.borrow();
            keys.into_iter()
                .filter_map(|key| state.watches.get(key))
                .map(|watch| {
                    let result = if state.denied_reads.contains(&watch.query.collection) {
                        Err(RemoteError::permission_denied(format!(
                            "read of {} denied",
                            watch.query.collection
                        )))
                    } else {
                        Ok(state.snapshot(&watch.query))
                    };
                    (Rc::clone(&watch.callback), result)
                })
                .collect::<Vec<_>>()
        };

        // no borrow held: callbacks may unsubscribe, or read the remote
        for (callback, result) in deliveries {
            (callback.borrow_mut())(result);
        }
    }
}

impl MemoryState {
    fn snapshot(&self, query: &Query) -> Snapshot {
        let mut documents = self
            .collections
            .get(&query.collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            documents.sort_by(|a, b| {
                let ordering = compare_values(a.data.get(&order.field), b.data.get(&order.field));
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        Snapshot { documents }
    }
}

/// Missing and null sort first, then booleans, numbers, strings; anything else compares equal.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn resolve_server_values(data: &mut Map<String, Value>) {
    let now = crate::now_millis();
    for value in data.values_mut() {
        if is_server_timestamp(value) {
            *value = Value::from(now);
        }
    }
}

impl Remote for MemoryRemote {
    fn set_document(
        &self,
        collection: &CollectionPath,
        id: &str,
        mut data: Map<String, Value>,
    ) -> RemoteFuture {
        let id = id.to_string();
        self.write(collection, move |documents| {
            resolve_server_values(&mut data);
            documents.insert(id, data);
            Ok(())
        })
    }

    fn update_document(
        &self,
        collection: &CollectionPath,
        id: &str,
        mut fields: Map<String, Value>,
    ) -> RemoteFuture {
        let id = id.to_string();
        let path = collection.clone();
        self.write(collection, move |documents| {
            let Some(document) = documents.get_mut(&id) else {
                return Err(RemoteError::new(
                    RemoteErrorKind::NotFound,
                    format!("no document {id} in {path}"),
                ));
            };
            resolve_server_values(&mut fields);
            document.extend(fields);
            Ok(())
        })
    }

    fn delete_document(&self, collection: &CollectionPath, id: &str) -> RemoteFuture {
        let id = id.to_string();
        self.write(collection, move |documents| {
            documents.remove(&id);
            Ok(())
        })
    }

    fn subscribe(&self, query: Query, on_change: SnapshotCallback) -> Subscription {
        let key = {
            let mut state = self.state.borrow_mut();
            let key = state.watches.insert(Watch {
                query,
                callback: Rc::new(RefCell::new(on_change)),
            });
            state.pending.insert(key);
            key
        };

        let state: Weak<RefCell<MemoryState>> = Rc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.borrow_mut();
                state.watches.remove(key);
                state.pending.remove(&key);
            }
        })
    }
}
