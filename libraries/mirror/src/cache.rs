//! Local cache slots.
//!
//! Each store persists its full state as JSON text under one string key. Reads fall back to a caller supplied
//! default on any failure, writes are fire-and-forget. The cache is an offline fallback, never the source of truth.

use std::{cell::RefCell, collections::HashMap, path::PathBuf};

use serde::{Serialize, de::DeserializeOwned};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A string keyed, string valued persistent storage area.
pub trait CacheSlots {
    /// Read the text stored at `key`, if any.
    fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Load the value stored at `key`. Missing, unreadable or undecodable slots all yield `fallback`.
pub fn load<T: DeserializeOwned>(slots: &dyn CacheSlots, key: &str, fallback: T) -> T {
    let raw = match slots.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return fallback,
        Err(e) => {
            log::warn!("Failed to read cache slot {key}: {e}");
            return fallback;
        }
    };

    serde_json::from_str(&raw).unwrap_or_else(|e| {
        log::warn!("Discarding undecodable cache slot {key}: {e}");
        fallback
    })
}

/// Encode `value` and store it at `key`. Failures are logged and otherwise ignored.
pub fn save<T: Serialize + ?Sized>(slots: &dyn CacheSlots, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(CacheError::from)
        .and_then(|encoded| slots.write(key, &encoded));

    if let Err(e) = result {
        log::error!("Failed to save cache slot {key}: {e}");
    }
}

/// Process-local slots. Nothing survives the process, which is what tests want.
#[derive(Debug, Default)]
pub struct MemorySlots {
    slots: RefCell<HashMap<String, String>>,
}

impl MemorySlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}

impl CacheSlots for MemorySlots {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.slots.borrow().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.slots
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per slot inside a directory. Keys are flattened into file names.
#[derive(Debug, Clone)]
pub struct FileSlots {
    directory: PathBuf,
}

impl FileSlots {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '.' => c,
                _ => '_',
            })
            .collect();
        self.directory.join(format!("{file_name}.json"))
    }
}

impl CacheSlots for FileSlots {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        // write-then-rename so a crash never leaves a half written slot behind
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// The browser's `localStorage`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserStorage;

#[cfg(target_arch = "wasm32")]
impl BrowserStorage {
    fn storage() -> Result<web_sys::Storage, CacheError> {
        web_sys::window()
            .ok_or_else(|| CacheError::Unavailable("no window".to_string()))?
            .local_storage()
            .map_err(|e| CacheError::Unavailable(format!("{e:?}")))?
            .ok_or_else(|| CacheError::Unavailable("localStorage disabled".to_string()))
    }
}

#[cfg(target_arch = "wasm32")]
impl CacheSlots for BrowserStorage {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Self::storage()?
            .get_item(key)
            .map_err(|e| CacheError::Unavailable(format!("{e:?}")))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        // setItem throws when the quota is exceeded
        Self::storage()?
            .set_item(key, value)
            .map_err(|e| CacheError::Unavailable(format!("{e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_load_never_written_key_returns_fallback() {
        let slots = MemorySlots::new();
        let fallback: BTreeMap<String, Vec<u32>> = BTreeMap::from([("a".to_string(), vec![1])]);
        assert_eq!(load(&slots, "missing:v1", fallback.clone()), fallback);
    }

    #[test]
    fn test_save_then_load_returns_saved_state() {
        let slots = MemorySlots::new();
        let state: BTreeMap<String, Vec<u32>> = BTreeMap::from([
            ("pablo".to_string(), vec![3, 2, 1]),
            ("celia".to_string(), vec![]),
        ]);
        save(&slots, "state:v1", &state);
        assert_eq!(load(&slots, "state:v1", BTreeMap::new()), state);
    }

    #[test]
    fn test_corrupt_slot_falls_back() {
        let slots = MemorySlots::new();
        slots.write("state:v1", "{not json").unwrap();
        assert_eq!(load(&slots, "state:v1", vec![7u32]), vec![7]);
    }

    #[test]
    fn test_schema_mismatch_falls_back() {
        let slots = MemorySlots::new();
        save(&slots, "state:v1", &serde_json::json!({ "unexpected": true }));
        let loaded: Vec<String> = load(&slots, "state:v1", vec!["fallback".to_string()]);
        assert_eq!(loaded, vec!["fallback".to_string()]);
    }

    #[test]
    fn test_file_slots_round_trip() {
        let directory =
            std::env::temp_dir().join(format!("mirror-cache-test-{}", crate::new_id()));
        let slots = FileSlots::new(&directory).unwrap();

        assert_eq!(slots.read("track-anime:profiles:v1").unwrap(), None);
        save(&slots, "track-anime:profiles:v1", &vec![1u8, 2, 3]);
        assert_eq!(load(&slots, "track-anime:profiles:v1", Vec::<u8>::new()), vec![1, 2, 3]);

        std::fs::remove_dir_all(&directory).unwrap();
    }
}
