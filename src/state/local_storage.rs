// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client-side key-value store used to rehydrate state across restarts.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Every key this application writes starts with this.
pub const APP_PREFIX: &str = "STREAM-";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Serialized state blobs keyed by string.
///
/// `key` arguments are unprefixed; [`LocalStorage::keys`] returns the raw
/// stored keys.
pub trait LocalStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<Value>;
    fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Vec<String>;
}

fn prefixed(key: &str) -> String {
    format!("{}{}", APP_PREFIX, key)
}

/// Fold every prefixed key into one nested state object.
///
/// `STREAM-AUTH` becomes `auth`; `STREAM-SETTINGS.DARK-THEME` becomes
/// `settings.darkTheme`.
pub fn load_initial_state(storage: &dyn LocalStorage) -> Value {
    let mut state = Map::new();

    for raw in storage.keys() {
        let Some(stripped) = raw.strip_prefix(APP_PREFIX) else {
            continue;
        };
        let Some(value) = storage.get_item(stripped) else {
            continue;
        };

        let path: Vec<String> = stripped.split('.').map(camel_case_key).collect();
        insert_nested(&mut state, &path, value);
    }

    Value::Object(state)
}

/// `DARK-THEME` -> `darkTheme`
fn camel_case_key(segment: &str) -> String {
    let lower = segment.to_lowercase();
    let mut words = lower.split('-');
    let mut key = words.next().unwrap_or_default().to_string();
    for word in words {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            key.extend(first.to_uppercase());
            key.push_str(chars.as_str());
        }
    }
    key
}

fn insert_nested(state: &mut Map<String, Value>, path: &[String], value: Value) {
    match path {
        [] => {}
        [last] => {
            state.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let child = state
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                insert_nested(child, rest, value);
            }
        }
    }
}

/// In-process storage.
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<Map<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<Value> {
        let items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        items.get(&prefixed(key)).cloned()
    }

    fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        items.insert(prefixed(key), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        items.remove(&prefixed(key));
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        let items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        items.keys().cloned().collect()
    }
}

/// Storage backed by one JSON object file, rewritten on every change.
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<Map<String, Value>>,
}

impl FileStorage {
    /// Open `path`, starting empty when it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let items = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), keys = items.len(), "Opened state file");
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &Map<String, Value>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(items)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

impl LocalStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<Value> {
        let items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        items.get(&prefixed(key)).cloned()
    }

    fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        let mut next = items.clone();
        next.insert(prefixed(key), value);
        self.persist(&next)?;
        *items = next;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        let mut next = items.clone();
        if next.remove(&prefixed(key)).is_some() {
            self.persist(&next)?;
            *items = next;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        let items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        items.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camel_case_key() {
        assert_eq!(camel_case_key("AUTH"), "auth");
        assert_eq!(camel_case_key("DARK-THEME"), "darkTheme");
        assert_eq!(camel_case_key("PAGE-ANIMATIONS-DISABLED"), "pageAnimationsDisabled");
    }

    #[test]
    fn test_load_initial_state_nests_keys() {
        let storage = MemoryStorage::new();
        storage
            .set_item("AUTH", json!({ "isAuthenticated": true }))
            .unwrap();
        storage.set_item("SETTINGS.DARK-THEME", json!(true)).unwrap();
        storage.set_item("SETTINGS.LANGUAGE", json!("en")).unwrap();

        assert_eq!(
            load_initial_state(&storage),
            json!({
                "auth": { "isAuthenticated": true },
                "settings": { "darkTheme": true, "language": "en" },
            })
        );
    }

    #[test]
    fn test_foreign_keys_are_ignored() {
        let storage = MemoryStorage::new();
        storage
            .items
            .lock()
            .unwrap()
            .insert("OTHER-APP".to_string(), json!(1));
        assert_eq!(load_initial_state(&storage), json!({}));
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "stream-state-{}-{}.json",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        {
            let storage = FileStorage::open(&path).unwrap();
            storage
                .set_item("AUTH", json!({ "isAuthenticated": true }))
                .unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get_item("AUTH"),
            Some(json!({ "isAuthenticated": true }))
        );
        assert_eq!(reopened.keys(), vec!["STREAM-AUTH".to_string()]);

        reopened.remove_item("AUTH").unwrap();
        assert_eq!(FileStorage::open(&path).unwrap().get_item("AUTH"), None);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let path = std::env::temp_dir()
            .join(format!("stream-missing-{}", std::process::id()))
            .join("state.json");
        let storage = FileStorage::open(&path).unwrap();

        let err = storage
            .set_item("AUTH", json!({ "isAuthenticated": true }))
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(storage.get_item("AUTH"), None);
        assert!(storage.keys().is_empty());
    }
}
