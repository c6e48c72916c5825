//! This is a library for keeping local, optimistic mirrors of remote document collections.
//! It was created for the anime tracker, so it doesn't include much that was not needed for that project.
//!
//! Mirroring strategy:
//! 1. Each store keeps an in-memory index from an owner key (usually a profile id) to an ordered list of records.
//! 2. Mutations are applied to the index immediately, then written to the remote collection in the background.
//!    Remote writes are never awaited, retried or rolled back.
//! 3. While connected, the store holds a live query on the remote collection. Every snapshot the remote delivers
//!    replaces the whole index. There is no merging and no diffing.
//! 4. Every state change is also written to a local cache slot, which is read back on startup as an offline fallback.
//!
//! Because the snapshot replace is destructive, an optimistic write can briefly disappear if a snapshot that
//! predates it arrives before the write is acknowledged. That is accepted.

pub mod auth;
pub mod cache;
pub mod field;
pub mod listeners;
pub mod memory;
pub mod remote;
pub mod store;

pub use field::Field;
pub use listeners::{ListenerKey, Listeners};
pub use store::{
    CollectionSpec, CollectionStore, Connection, ConnectionState, LiveBinding, Services,
};

use crate::remote::Document;

/// A record mirrored from a remote collection.
pub trait Record: Clone + serde::Serialize + serde::de::DeserializeOwned + 'static {
    /// Document id of the record, which is also its id in the remote collection.
    fn id(&self) -> &str;

    /// Key the in-memory index groups this record under.
    fn index_key(&self) -> &str;

    /// Rebuild a record from a remote document. The document id always wins over any `id` in the body.
    fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        let mut data = document.data.clone();
        data.insert(
            "id".to_string(),
            serde_json::Value::String(document.id.clone()),
        );
        serde_json::from_value(serde_json::Value::Object(data))
    }
}

/// Generate a fresh record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time in milliseconds since the Unix epoch, the timestamp unit records are stamped with.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Spawns fire-and-forget remote writes on the browser's microtask queue.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default, Clone, Copy)]
pub struct WasmSpawner;

#[cfg(target_arch = "wasm32")]
impl futures::task::LocalSpawn for WasmSpawner {
    fn spawn_local_obj(
        &self,
        future: futures::task::LocalFutureObj<'static, ()>,
    ) -> Result<(), futures::task::SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}
