use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{KeepsakeError, Result};

/// Key under which the whole [`AppState`](super::AppState) document lives.
pub const APP_DATA_KEY: &str = "keepsake-app-data";
/// Key under which the active couple identifier lives.
pub const COUPLE_ID_KEY: &str = "keepsake-couple-id";

/// String key-value persistence with atomic single-key writes.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn default_dir() -> Option<PathBuf> {
        std::env::var("XDG_DATA_HOME")
            .ok()
            .map(|xdg| PathBuf::from(xdg).join("keepsake"))
            .or_else(|| {
                directories::BaseDirs::new()
                    .map(|dirs| dirs.home_dir().join(".local").join("share").join("keepsake"))
            })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(KeepsakeError::Invalid(format!("store key {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// A typed JSON document stored under one key.
pub struct Persisted<T> {
    kv: Arc<dyn KvStore>,
    key: String,
    _doc: PhantomData<fn() -> T>,
}

impl<T> Clone for Persisted<T> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            key: self.key.clone(),
            _doc: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Persisted<T> {
    pub fn new(kv: Arc<dyn KvStore>, key: &str) -> Self {
        Self {
            kv,
            key: key.to_string(),
            _doc: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stored document, or `default` when it is missing or unreadable.
    pub fn read(&self, default: T) -> T {
        let raw = match self.kv.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(e) => {
                tracing::debug!(key = %self.key, error = %e, "local read failed; using default");
                return default;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::debug!(key = %self.key, error = %e, "stored document unparsable; using default");
                default
            }
        }
    }

    pub fn write(&self, doc: &T) -> Result<()> {
        let result = serde_json::to_string(doc)
            .map_err(KeepsakeError::from)
            .and_then(|raw| self.kv.set(&self.key, &raw));
        if let Err(e) = &result {
            tracing::warn!(key = %self.key, error = %e, "local write failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{AppState, BucketItem, Category};
    use tempfile::TempDir;

    fn sample_state() -> AppState {
        AppState {
            onboarded: true,
            partner1: "Ana".into(),
            partner2: "Ben".into(),
            bucket_list: vec![BucketItem {
                id: 7,
                text: "Lisbon".into(),
                category: Category::Travel,
                done: false,
            }],
            dark_mode: true,
            ..AppState::default()
        }
    }

    #[test]
    fn file_store_round_trips_document() {
        let tmp = TempDir::new().unwrap();
        let kv: Arc<dyn KvStore> = Arc::new(FileStore::open(tmp.path()).unwrap());
        let slot = Persisted::<AppState>::new(kv, APP_DATA_KEY);

        let doc = sample_state();
        slot.write(&doc).unwrap();
        assert_eq!(slot.read(AppState::default()), doc);
    }

    #[test]
    fn missing_document_reads_default() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let slot = Persisted::<AppState>::new(kv, APP_DATA_KEY);
        assert_eq!(slot.read(AppState::default()), AppState::default());
    }

    #[test]
    fn corrupt_document_reads_default() {
        let store = MemoryStore::new();
        store.set(APP_DATA_KEY, "{not json").unwrap();
        let slot = Persisted::<AppState>::new(Arc::new(store), APP_DATA_KEY);
        assert_eq!(slot.read(AppState::default()), AppState::default());
    }

    #[test]
    fn wrong_shape_reads_default() {
        let store = MemoryStore::new();
        store.set(APP_DATA_KEY, r#"{"onboarded": "yes"}"#).unwrap();
        let slot = Persisted::<AppState>::new(Arc::new(store), APP_DATA_KEY);
        assert!(!slot.read(AppState::default()).onboarded);
    }

    #[test]
    fn file_store_overwrites_and_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path().join("nested")).unwrap();
        store.set(COUPLE_ID_KEY, "\"one\"").unwrap();
        store.set(COUPLE_ID_KEY, "\"two\"").unwrap();

        assert_eq!(store.get(COUPLE_ID_KEY).unwrap().as_deref(), Some("\"two\""));
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{}.json", COUPLE_ID_KEY)]);
    }

    #[test]
    fn file_store_remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        assert!(matches!(
            store.set("../escape", "x"),
            Err(KeepsakeError::Invalid(_))
        ));
        assert!(store.get("").is_err());
    }

    #[test]
    fn write_failure_is_reported() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        let dir = store.dir().to_path_buf();
        let kv: Arc<dyn KvStore> = Arc::new(store);
        let slot = Persisted::<AppState>::new(kv, APP_DATA_KEY);
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(slot.write(&sample_state()), Err(KeepsakeError::Io(_))));
    }

    #[test]
    fn default_dir_honors_xdg_data_home() {
        let dir = FileStore::default_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("keepsake"));
    }
}
