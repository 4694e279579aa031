use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::api::client::SupabaseClient;
use crate::api::types::{Asset, RemoteRecord};
use crate::error::Result;
use crate::state::CoupleId;

/// The four operations the app needs from a hosted backend.
pub trait RemoteStore: Send + Sync {
    fn create<'a>(&'a self, data: &'a serde_json::Value) -> BoxFuture<'a, Result<CoupleId>>;

    fn load<'a>(&'a self, id: &'a CoupleId) -> BoxFuture<'a, Result<RemoteRecord>>;

    fn update<'a>(
        &'a self,
        id: &'a CoupleId,
        data: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<()>>;

    fn upload_asset<'a>(
        &'a self,
        id: &'a CoupleId,
        asset: &'a Asset,
        purpose: &'a str,
    ) -> BoxFuture<'a, Result<String>>;
}

impl RemoteStore for SupabaseClient {
    fn create<'a>(&'a self, data: &'a serde_json::Value) -> BoxFuture<'a, Result<CoupleId>> {
        self.create_couple(data).boxed()
    }

    fn load<'a>(&'a self, id: &'a CoupleId) -> BoxFuture<'a, Result<RemoteRecord>> {
        self.load_couple(id).boxed()
    }

    fn update<'a>(
        &'a self,
        id: &'a CoupleId,
        data: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<()>> {
        self.save_couple(id, data).boxed()
    }

    fn upload_asset<'a>(
        &'a self,
        id: &'a CoupleId,
        asset: &'a Asset,
        purpose: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        self.upload_photo(id, asset, purpose).boxed()
    }
}

/// Optional backend. Without one every operation is a quiet no-op; with one,
/// failures are logged and collapse to the same neutral values.
#[derive(Clone, Default)]
pub struct Cloud {
    remote: Option<Arc<dyn RemoteStore>>,
}

impl Cloud {
    pub fn disabled() -> Self {
        Self { remote: None }
    }

    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote: Some(remote),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        self.remote.clone()
    }

    pub async fn create(&self, data: &serde_json::Value) -> Option<CoupleId> {
        let remote = self.remote.as_ref()?;
        remote
            .create(data)
            .await
            .map_err(|e| tracing::warn!(error = %e, "create couple failed"))
            .ok()
    }

    pub async fn load(&self, id: &CoupleId) -> Option<RemoteRecord> {
        let remote = self.remote.as_ref()?;
        remote
            .load(id)
            .await
            .map_err(|e| tracing::warn!(couple_id = %id, error = %e, "load couple failed"))
            .ok()
    }

    pub async fn update(&self, id: &CoupleId, data: &serde_json::Value) -> bool {
        let Some(remote) = self.remote.as_ref() else {
            return false;
        };
        match remote.update(id, data).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(couple_id = %id, error = %e, "save couple failed");
                false
            }
        }
    }

    pub async fn upload_asset(&self, id: &CoupleId, asset: &Asset, purpose: &str) -> Option<String> {
        let remote = self.remote.as_ref()?;
        remote
            .upload_asset(id, asset, purpose)
            .await
            .map_err(|e| tracing::warn!(couple_id = %id, purpose, error = %e, "asset upload failed"))
            .ok()
    }

    /// A renderable reference for `asset`: the uploaded public URL when
    /// possible, an inline data URL otherwise.
    pub async fn resolve_asset(&self, id: Option<&CoupleId>, asset: &Asset, purpose: &str) -> String {
        if let Some(id) = id {
            if let Some(url) = self.upload_asset(id, asset, purpose).await {
                return url;
            }
        }
        asset.to_data_url()
    }
}
