use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::api::backend::RemoteStore;
use crate::api::types::{Asset, RemoteRecord};
use crate::error::{KeepsakeError, Result};
use crate::state::CoupleId;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(Value),
    Load(CoupleId),
    Update(CoupleId, Value),
    Upload(CoupleId, String),
}

/// In-process backend recording every call it receives.
#[derive(Default)]
pub struct MemoryRemote {
    rows: Mutex<HashMap<CoupleId, RemoteRecord>>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU64,
    load_delay: Mutex<Duration>,
    failing: AtomicBool,
    failing_loads: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &str, data: Value) {
        self.rows.lock().unwrap().insert(
            CoupleId::from(id),
            RemoteRecord {
                data,
                updated_at: Some(Utc::now()),
            },
        );
    }

    pub fn row(&self, id: &str) -> Option<Value> {
        self.rows
            .lock()
            .unwrap()
            .get(&CoupleId::from(id))
            .map(|r| r.data.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap() = delay;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Only loads fail; writes keep working.
    pub fn set_failing_loads(&self, failing: bool) {
        self.failing_loads.store(failing, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(KeepsakeError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(())
    }
}

impl RemoteStore for MemoryRemote {
    fn create<'a>(&'a self, data: &'a Value) -> BoxFuture<'a, Result<CoupleId>> {
        async move {
            self.record(Call::Create(data.clone()));
            self.check()?;
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let id = CoupleId(format!("couple-{}", n));
            self.insert(id.as_str(), data.clone());
            Ok(id)
        }
        .boxed()
    }

    fn load<'a>(&'a self, id: &'a CoupleId) -> BoxFuture<'a, Result<RemoteRecord>> {
        async move {
            self.record(Call::Load(id.clone()));
            let delay = *self.load_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.check()?;
            if self.failing_loads.load(Ordering::SeqCst) {
                return Err(KeepsakeError::Api {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            self.rows
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| KeepsakeError::NotFound(format!("couple {}", id)))
        }
        .boxed()
    }

    fn update<'a>(&'a self, id: &'a CoupleId, data: &'a Value) -> BoxFuture<'a, Result<()>> {
        async move {
            self.record(Call::Update(id.clone(), data.clone()));
            self.check()?;
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .get_mut(id)
                .ok_or_else(|| KeepsakeError::NotFound(format!("couple {}", id)))?;
            row.data = data.clone();
            row.updated_at = Some(Utc::now());
            Ok(())
        }
        .boxed()
    }

    fn upload_asset<'a>(
        &'a self,
        id: &'a CoupleId,
        asset: &'a Asset,
        purpose: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            self.record(Call::Upload(id.clone(), purpose.to_string()));
            self.check()?;
            Ok(format!("memory://{}/{}_{}", id, purpose, asset.file_name))
        }
        .boxed()
    }
}
