use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use tokio::sync::watch;

use super::store::{KvStore, Persisted, APP_DATA_KEY};
use super::types::{AppState, LOCAL_ONLY_FIELDS};
use crate::error::{KeepsakeError, Result};

/// The one owned [`AppState`], shared by cloning.
///
/// Every mutation is a read-modify-write under a single lock: the new
/// document is published to subscribers, then persisted. A persistence
/// failure is returned to the caller but the in-memory document still
/// moves forward.
#[derive(Clone)]
pub struct AppStore {
    inner: Arc<Inner>,
}

struct Inner {
    slot: Persisted<AppState>,
    current: Mutex<AppState>,
    tx: watch::Sender<AppState>,
}

impl AppStore {
    pub fn open(kv: Arc<dyn KvStore>) -> Self {
        let slot = Persisted::new(kv, APP_DATA_KEY);
        let doc = slot.read(AppState::default());
        let (tx, _rx) = watch::channel(doc.clone());
        Self {
            inner: Arc::new(Inner {
                slot,
                current: Mutex::new(doc),
                tx,
            }),
        }
    }

    pub fn get(&self) -> AppState {
        self.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.inner.tx.subscribe()
    }

    pub fn update(&self, f: impl FnOnce(&mut AppState)) -> Result<()> {
        let mut current = self.lock();
        let mut next = current.clone();
        f(&mut next);
        self.commit(&mut current, next)
    }

    /// Shallow whole-document merge: every key of `partial` replaces the
    /// document's value for that key.
    pub fn merge(&self, partial: Value) -> Result<()> {
        let partial = into_object(partial)?;
        let mut current = self.lock();
        let next = merged(&*current, partial)?;
        self.commit(&mut current, next)
    }

    /// Shallow merge into the sub-document stored under `key`.
    pub fn merge_nested(&self, key: &str, partial: Value) -> Result<()> {
        let partial = into_object(partial)?;
        let mut current = self.lock();
        let mut doc = serde_json::to_value(&*current)?;
        let slot = doc
            .get_mut(key)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| KeepsakeError::Invalid(format!("{} is not a nested document", key)))?;
        slot.extend(partial);
        let next: AppState = serde_json::from_value(doc)?;
        self.commit(&mut current, next)
    }

    /// Shallow-merge a remote document, but only if `still_current` accepts
    /// the local document as it is at that moment. Local-only keys in the
    /// remote document are ignored. Returns whether it was applied.
    pub fn apply_remote(
        &self,
        data: &Value,
        still_current: impl FnOnce(&AppState) -> bool,
    ) -> Result<bool> {
        let mut partial = into_object(data.clone())?;
        for key in LOCAL_ONLY_FIELDS {
            partial.remove(*key);
        }
        let mut current = self.lock();
        if !still_current(&*current) {
            return Ok(false);
        }
        let next = merged(&*current, partial)?;
        self.commit(&mut current, next)?;
        Ok(true)
    }

    fn commit(&self, current: &mut MutexGuard<'_, AppState>, next: AppState) -> Result<()> {
        if next == **current {
            return Ok(());
        }
        **current = next;
        self.inner.tx.send_replace((**current).clone());
        self.inner.slot.write(&**current)
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(KeepsakeError::Invalid(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn merged(doc: &AppState, partial: Map<String, Value>) -> Result<AppState> {
    let mut value = serde_json::to_value(doc)?;
    if let Some(map) = value.as_object_mut() {
        map.extend(partial);
    }
    Ok(serde_json::from_value(value)?)
}
