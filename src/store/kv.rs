use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

use super::{decode_records, encode_records, BackendKind, RecordMap, StoreBackend};
use crate::error::StoreError;
use crate::models::Namespace;

/// A simple string key-value store, the shape of a browser's local storage.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Fallback backend: one key per namespace holding the JSON-encoded mapping.
pub struct KeyValueBackend {
    store: Box<dyn KeyValueStore>,
}

impl KeyValueBackend {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Open the SQLite store at `path`, or an in-process map if that fails.
    pub fn open_or_memory(path: Option<&Path>) -> Self {
        if let Some(path) = path {
            match SqliteKeyValueStore::open(path) {
                Ok(store) => return Self::new(store),
                Err(e) => tracing::warn!(
                    "Key-value store at {} unavailable, keeping records in memory: {}",
                    path.display(),
                    e
                ),
            }
        }
        Self::new(MemoryKeyValueStore::default())
    }
}

impl StoreBackend for KeyValueBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    fn read(&self, namespace: Namespace) -> Result<RecordMap, StoreError> {
        match self.store.get_item(namespace.storage_key())? {
            Some(raw) => decode_records(&raw),
            None => Ok(RecordMap::new()),
        }
    }

    fn write(&self, namespace: Namespace, records: &RecordMap) -> Result<(), StoreError> {
        let raw = encode_records(records, false)?;
        self.store.set_item(namespace.storage_key(), &raw)
    }
}

/// SQLite-backed key-value store.
pub struct SqliteKeyValueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyValueStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    pub fn open_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        super::schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv_items WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv_items (key, value, updated_at) VALUES (?, ?, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, value),
        )?;
        Ok(())
    }
}

impl Clone for SqliteKeyValueStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

/// In-process store of last resort. Records live as long as the process.
#[derive(Default, Clone)]
pub struct MemoryKeyValueStore {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_store_overwrites_items() {
        let store = SqliteKeyValueStore::open_memory().unwrap();
        assert_eq!(store.get_item("k").unwrap(), None);

        store.set_item("k", "one").unwrap();
        store.set_item("k", "two").unwrap();
        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn namespaces_use_separate_keys() {
        let store = MemoryKeyValueStore::default();
        let backend = KeyValueBackend::new(store.clone());

        let mut colors = RecordMap::new();
        colors.insert("g1".to_string(), "rgb(1, 2, 3)".to_string());
        backend.write(Namespace::Colors, &colors).unwrap();

        assert_eq!(
            store.get_item("tab_groups.colors").unwrap().as_deref(),
            Some(r#"{"g1":"rgb(1, 2, 3)"}"#)
        );
        assert!(backend.read(Namespace::Icons).unwrap().is_empty());
    }
}
