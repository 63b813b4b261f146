//! Persistence for per-group colors and icons.
//!
//! Two namespaces (`colors`, `icons`), each a flat JSON object mapping entity id
//! to value string. The preferred backend keeps one file per namespace; the
//! fallback keeps the same JSON under one key per namespace in a key-value store.
//! The backend is chosen once, when the store is opened.

mod file;
mod kv;
mod schema;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

pub use file::FileBackend;
pub use kv::{KeyValueBackend, KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};

use crate::config::{BackendPreference, Settings};
use crate::error::StoreError;
use crate::models::{EntityId, Namespace};

/// Entity id → value for one namespace.
pub type RecordMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    File,
    KeyValue,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::KeyValue => "key_value",
        }
    }
}

/// A storage backend holding whole namespace mappings.
pub trait StoreBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Load the full mapping. A namespace that was never written is empty.
    fn read(&self, namespace: Namespace) -> Result<RecordMap, StoreError>;

    /// Replace the full mapping.
    fn write(&self, namespace: Namespace, records: &RecordMap) -> Result<(), StoreError>;
}

pub(crate) fn decode_records(raw: &str) -> Result<RecordMap, StoreError> {
    if raw.trim().is_empty() {
        return Ok(RecordMap::new());
    }
    Ok(serde_json::from_str(raw)?)
}

pub(crate) fn encode_records(records: &RecordMap, pretty: bool) -> Result<String, StoreError> {
    let raw = if pretty {
        serde_json::to_string_pretty(records)?
    } else {
        serde_json::to_string(records)?
    };
    Ok(raw)
}

/// The single writer of the color and icon records.
///
/// Reads never fail: missing and corrupt data both come back as an empty
/// mapping. Mutations are read-modify-write of the whole mapping, serialized
/// within the process; across processes the last write wins.
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn StoreBackend>,
    write_lock: Arc<Mutex<()>>,
}

impl PersistentStore {
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Select a backend according to `settings`.
    ///
    /// The file backend is used when preferred and its directory is usable;
    /// every other case lands on the key-value backend, which is always available.
    pub fn open(settings: &Settings) -> Self {
        if settings.backend != BackendPreference::KeyValue {
            match settings.resolved_storage_dir() {
                Some(dir) => match FileBackend::open(&dir) {
                    Ok(backend) => {
                        tracing::debug!("Using file storage at {}", dir.display());
                        return Self::new(backend);
                    }
                    Err(e) => tracing::warn!(
                        "File storage at {} unavailable, using key-value fallback: {}",
                        dir.display(),
                        e
                    ),
                },
                None => tracing::warn!("No storage directory available, using key-value fallback"),
            }
        }
        let path = settings.resolved_key_value_path();
        Self::new(KeyValueBackend::open_or_memory(path.as_deref()))
    }

    /// In-process store, for tests and hosts without any persistent storage.
    pub fn open_memory() -> Self {
        Self::new(KeyValueBackend::new(MemoryKeyValueStore::default()))
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Full current mapping for `namespace`, empty on any failure.
    pub fn get(&self, namespace: Namespace) -> RecordMap {
        match self.backend.read(namespace) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Treating saved {} as empty: {}", namespace.as_str(), e);
                RecordMap::new()
            }
        }
    }

    pub fn put(&self, namespace: Namespace, key: &EntityId, value: &str) -> Result<(), StoreError> {
        self.update(namespace, |records| {
            records.insert(key.to_string(), value.to_string());
            true
        })
    }

    /// Set several keys in one read-modify-write. Keys not listed are kept.
    pub fn put_many<'a, I>(&self, namespace: Namespace, entries: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (&'a EntityId, &'a str)>,
    {
        self.update(namespace, |records| {
            let mut changed = false;
            for (key, value) in entries {
                if records.get(key.as_str()).map(String::as_str) != Some(value) {
                    records.insert(key.to_string(), value.to_string());
                    changed = true;
                }
            }
            changed
        })
    }

    /// Delete `key`. No write happens when the key is absent.
    pub fn remove(&self, namespace: Namespace, key: &EntityId) -> Result<(), StoreError> {
        self.update(namespace, |records| records.remove(key.as_str()).is_some())
    }

    /// Invoke `apply` for every saved record whose entity is still live.
    ///
    /// Returns how many records were applied.
    pub fn apply_all<L, F>(&self, namespace: Namespace, is_live: L, mut apply: F) -> usize
    where
        L: Fn(&EntityId) -> bool,
        F: FnMut(&EntityId, &str),
    {
        let mut applied = 0;
        for (key, value) in self.get(namespace) {
            let id = EntityId::new(key);
            if is_live(&id) {
                apply(&id, &value);
                applied += 1;
            }
        }
        applied
    }

    /// Read-modify-write. `mutate` returns whether anything changed.
    ///
    /// A corrupt mapping is replaced; any other read failure aborts the write so
    /// records that merely could not be read are not clobbered.
    fn update<F>(&self, namespace: Namespace, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RecordMap) -> bool,
    {
        let _guard = self.write_lock.lock();
        let mut records = match self.backend.read(namespace) {
            Ok(records) => records,
            Err(StoreError::Json(e)) => {
                tracing::warn!("Replacing corrupt {} records: {}", namespace.as_str(), e);
                RecordMap::new()
            }
            Err(e) => return Err(e),
        };
        if mutate(&mut records) {
            self.backend.write(namespace, &records)?;
        }
        Ok(())
    }
}
