//! The remote side: a document database with live, ordered queries.
//!
//! Nothing here knows about a particular vendor. Hosts implement [`Remote`] on top of whatever transport they
//! have, [`crate::memory::MemoryRemote`] implements it in-process.

use std::fmt;

use futures::future::LocalBoxFuture;
use serde_json::{Map, Value};

/// Path of a document collection, e.g. `pairs/anime-tracker/premieres`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new<S: AsRef<str>>(segments: impl IntoIterator<Item = S>) -> Self {
        let joined = segments
            .into_iter()
            .map(|segment| segment.as_ref().trim_matches('/').to_string())
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// A live view of a whole collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub collection: CollectionPath,
    pub order: Option<OrderBy>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

/// The complete, ordered result of a live query at one point in time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RemoteErrorKind {
    #[error("permission denied")]
    PermissionDenied,
    #[error("not found")]
    NotFound,
    #[error("unavailable")]
    Unavailable,
    #[error("remote error")]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::PermissionDenied, message)
    }

    pub fn is_permission_denied(&self) -> bool {
        self.kind == RemoteErrorKind::PermissionDenied
    }
}

pub type RemoteFuture = LocalBoxFuture<'static, Result<(), RemoteError>>;

pub type SnapshotCallback = Box<dyn FnMut(Result<Snapshot, RemoteError>)>;

/// Handle to a live registration. Dropping it (or calling [`Subscription::cancel`]) unregisters.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription with nothing to undo.
    pub fn noop() -> Self {
        Self { unsubscribe: None }
    }

    pub fn cancel(self) {
        drop(self)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// A document database with live queries.
///
/// Writes return `'static` futures so callers can spawn them and forget about them.
/// `subscribe` may deliver snapshots at any later point, but must not call `on_change` from inside `subscribe`.
pub trait Remote {
    /// Create or overwrite the document `id` with exactly `data`.
    fn set_document(&self, collection: &CollectionPath, id: &str, data: Map<String, Value>)
    -> RemoteFuture;

    /// Overwrite only the given top-level fields of an existing document.
    fn update_document(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: Map<String, Value>,
    ) -> RemoteFuture;

    fn delete_document(&self, collection: &CollectionPath, id: &str) -> RemoteFuture;

    fn subscribe(&self, query: Query, on_change: SnapshotCallback) -> Subscription;
}

const SERVER_VALUE_KEY: &str = ".sv";
const SERVER_TIMESTAMP: &str = "timestamp";

/// Placeholder asking the remote to store its own clock at write time.
pub fn server_timestamp() -> Value {
    let mut sentinel = Map::new();
    sentinel.insert(
        SERVER_VALUE_KEY.to_string(),
        Value::String(SERVER_TIMESTAMP.to_string()),
    );
    Value::Object(sentinel)
}

pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|object| object.get(SERVER_VALUE_KEY))
        .and_then(Value::as_str)
        == Some(SERVER_TIMESTAMP)
}

/// Encode a record as a document body. Optional fields are kept as explicit `null`s.
pub fn to_document_data<T: serde::Serialize>(value: &T) -> Result<Map<String, Value>, RemoteError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(RemoteError::new(
            RemoteErrorKind::Other,
            format!("expected a JSON object, got {other}"),
        )),
        Err(e) => Err(RemoteError::new(RemoteErrorKind::Other, e.to_string())),
    }
}
