use std::fs;

use speculate2::speculate;
use tabdeck::config::{BackendPreference, Settings};
use tabdeck::models::{EntityId, Namespace};
use tabdeck::store::{
    BackendKind, FileBackend, KeyValueBackend, KeyValueStore, PersistentStore, SqliteKeyValueStore,
};
use tempfile::TempDir;

fn file_store(dir: &TempDir) -> PersistentStore {
    PersistentStore::new(FileBackend::open(dir.path()).expect("Failed to open file backend"))
}

speculate! {
    before {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = file_store(&dir);
        let g1 = EntityId::new("g1");
    }

    describe "file backend" {
        it "round-trips a color" {
            store.put(Namespace::Colors, &g1, "rgb(1,2,3)").expect("put failed");

            let colors = store.get(Namespace::Colors);
            assert_eq!(colors.get("g1").map(String::as_str), Some("rgb(1,2,3)"));

            store.remove(Namespace::Colors, &g1).expect("remove failed");
            assert!(!store.get(Namespace::Colors).contains_key("g1"));
        }

        it "keeps namespaces independent" {
            store.put(Namespace::Colors, &g1, "rgb(1,2,3)").expect("put failed");
            store.put(Namespace::Icons, &g1, "chrome://icons/star.svg").expect("put failed");
            store.remove(Namespace::Icons, &g1).expect("remove failed");

            assert_eq!(store.get(Namespace::Colors).len(), 1);
            assert!(store.get(Namespace::Icons).is_empty());
        }

        it "writes a flat JSON object per namespace" {
            store.put(Namespace::Colors, &g1, "rgb(1,2,3)").expect("put failed");

            let raw = fs::read_to_string(dir.path().join("tab_group_colors.json")).expect("file missing");
            let parsed: serde_json::Value = serde_json::from_str(&raw).expect("not JSON");
            assert_eq!(parsed, serde_json::json!({ "g1": "rgb(1,2,3)" }));
        }

        it "returns empty for a missing namespace" {
            assert!(store.get(Namespace::Icons).is_empty());
        }

        it "treats corrupt content as empty" {
            fs::write(dir.path().join("tab_group_colors.json"), "{not json").expect("write failed");
            assert!(store.get(Namespace::Colors).is_empty());
        }

        it "replaces corrupt content on the next write" {
            fs::write(dir.path().join("tab_group_colors.json"), "[1, 2, 3]").expect("write failed");
            store.put(Namespace::Colors, &g1, "rgb(4,5,6)").expect("put failed");

            let colors = store.get(Namespace::Colors);
            assert_eq!(colors.len(), 1);
            assert_eq!(colors.get("g1").map(String::as_str), Some("rgb(4,5,6)"));
        }

        it "does not write when removing an absent key" {
            store.remove(Namespace::Colors, &g1).expect("remove failed");
            assert!(!dir.path().join("tab_group_colors.json").exists());
        }

        it "merges several keys at once" {
            store.put(Namespace::Colors, &EntityId::new("old"), "rgb(0, 0, 1)").expect("put failed");
            let g2 = EntityId::new("g2");
            store
                .put_many(Namespace::Colors, [(&g1, "rgb(1, 1, 1)"), (&g2, "rgb(2, 2, 2)")])
                .expect("put_many failed");

            let colors = store.get(Namespace::Colors);
            assert_eq!(colors.len(), 3);
            assert_eq!(colors.get("old").map(String::as_str), Some("rgb(0, 0, 1)"));
        }
    }

    describe "apply_all" {
        it "applies only records of live entities" {
            store.put(Namespace::Colors, &g1, "rgb(1,2,3)").expect("put failed");
            store.put(Namespace::Colors, &EntityId::new("gone"), "rgb(9,9,9)").expect("put failed");

            let mut applied = Vec::new();
            let count = store.apply_all(
                Namespace::Colors,
                |id| id.as_str() == "g1",
                |id, value| applied.push((id.to_string(), value.to_string())),
            );

            assert_eq!(count, 1);
            assert_eq!(applied, vec![("g1".to_string(), "rgb(1,2,3)".to_string())]);
        }
    }

    describe "key-value backend" {
        it "stores the same mapping shape under one key" {
            let sqlite = SqliteKeyValueStore::open_memory().expect("Failed to open sqlite");
            let kv = PersistentStore::new(KeyValueBackend::new(sqlite.clone()));
            kv.put(Namespace::Colors, &g1, "rgb(1,2,3)").expect("put failed");

            let raw = sqlite.get_item("tab_groups.colors").expect("get failed").expect("key missing");
            assert_eq!(raw, r#"{"g1":"rgb(1,2,3)"}"#);
            assert_eq!(kv.backend_kind(), BackendKind::KeyValue);
        }

        it "treats a corrupt value as empty" {
            let sqlite = SqliteKeyValueStore::open_memory().expect("Failed to open sqlite");
            sqlite.set_item("tab_groups.icons", "oops").expect("set failed");

            let kv = PersistentStore::new(KeyValueBackend::new(sqlite));
            assert!(kv.get(Namespace::Icons).is_empty());
        }

        it "persists across reopen of a sqlite file" {
            let path = dir.path().join("records.db");
            {
                let kv = PersistentStore::new(KeyValueBackend::new(
                    SqliteKeyValueStore::open(&path).expect("open failed"),
                ));
                kv.put(Namespace::Icons, &g1, "star").expect("put failed");
            }
            let kv = PersistentStore::new(KeyValueBackend::new(
                SqliteKeyValueStore::open(&path).expect("reopen failed"),
            ));
            assert_eq!(kv.get(Namespace::Icons).get("g1").map(String::as_str), Some("star"));
        }
    }

    describe "backend selection" {
        it "prefers the file backend" {
            let settings = Settings {
                storage_dir: Some(dir.path().join("records")),
                ..Settings::default()
            };
            assert_eq!(PersistentStore::open(&settings).backend_kind(), BackendKind::File);
        }

        it "honours a key-value preference" {
            let settings = Settings {
                storage_dir: Some(dir.path().to_path_buf()),
                backend: BackendPreference::KeyValue,
                ..Settings::default()
            };
            let selected = PersistentStore::open(&settings);
            assert_eq!(selected.backend_kind(), BackendKind::KeyValue);
            selected.put(Namespace::Colors, &g1, "rgb(1,2,3)").expect("put failed");
            assert!(dir.path().join("tabdeck.db").exists());
        }

        it "falls back when the storage directory is unusable" {
            let blocker = dir.path().join("not-a-dir");
            fs::write(&blocker, "file in the way").expect("write failed");
            let settings = Settings {
                storage_dir: Some(blocker.join("records")),
                key_value_path: Some(dir.path().join("fallback.db")),
                ..Settings::default()
            };

            let selected = PersistentStore::open(&settings);
            assert_eq!(selected.backend_kind(), BackendKind::KeyValue);
            selected.put(Namespace::Colors, &g1, "rgb(1,2,3)").expect("put failed");
            assert_eq!(selected.get(Namespace::Colors).len(), 1);
        }
    }
}
