use std::sync::Arc;

use tokio::sync::watch;
use url::Url;

use super::store::{KvStore, Persisted, COUPLE_ID_KEY};
use super::types::CoupleId;
use crate::error::{KeepsakeError, Result};

/// Query parameter carrying a shared couple identifier.
pub const SHARE_PARAM: &str = "couple";

/// Which couple record this session belongs to.
#[derive(Clone)]
pub struct Identity {
    inner: Arc<Inner>,
}

struct Inner {
    slot: Persisted<Option<CoupleId>>,
    tx: watch::Sender<Option<CoupleId>>,
    shared_view: bool,
}

impl Identity {
    /// Resolve the active identifier from the launch location first, then
    /// from what an earlier session persisted.
    pub fn resolve(kv: Arc<dyn KvStore>, location: Option<&str>) -> Self {
        let slot = Persisted::<Option<CoupleId>>::new(kv, COUPLE_ID_KEY);
        let from_link = location.and_then(couple_param).map(CoupleId);
        let shared_view = from_link.is_some();

        let current = match from_link {
            Some(id) => {
                tracing::info!(couple_id = %id, "entered through a shared link");
                // The link still wins for this session if it cannot be saved
                let _ = slot.write(&Some(id.clone()));
                Some(id)
            }
            None => slot.read(None),
        };

        let (tx, _rx) = watch::channel(current);
        Self {
            inner: Arc::new(Inner {
                slot,
                tx,
                shared_view,
            }),
        }
    }

    pub fn couple_id(&self) -> Option<CoupleId> {
        self.inner.tx.borrow().clone()
    }

    pub fn set(&self, id: CoupleId) -> Result<()> {
        self.inner.tx.send_replace(Some(id.clone()));
        self.inner.slot.write(&Some(id))
    }

    pub fn is_shared_view(&self) -> bool {
        self.inner.shared_view
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CoupleId>> {
        self.inner.tx.subscribe()
    }

    /// `base` with the current identifier as its only query parameter.
    pub fn share_link(&self, base: &str) -> Result<String> {
        share_link(base, self.couple_id().as_ref())
    }
}

pub fn share_link(base: &str, id: Option<&CoupleId>) -> Result<String> {
    let mut url =
        Url::parse(base).map_err(|e| KeepsakeError::Invalid(format!("share base {}: {}", base, e)))?;
    url.set_query(None);
    url.set_fragment(None);
    if let Some(id) = id {
        url.query_pairs_mut().append_pair(SHARE_PARAM, id.as_str());
    }
    Ok(url.to_string())
}

/// Accepts a full URL or a bare query string such as `?couple=abc`.
fn couple_param(location: &str) -> Option<String> {
    let value = match Url::parse(location) {
        Ok(url) => url
            .query_pairs()
            .find(|(k, _)| k == SHARE_PARAM)
            .map(|(_, v)| v.into_owned()),
        Err(_) => {
            let query = location.rsplit_once('?').map_or(location, |(_, q)| q);
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k == SHARE_PARAM)
                .map(|(_, v)| v.into_owned())
        }
    }?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::store::MemoryStore;

    fn kv_with_id(id: Option<&str>) -> Arc<dyn KvStore> {
        let kv = MemoryStore::new();
        if let Some(id) = id {
            kv.set(COUPLE_ID_KEY, &format!("\"{}\"", id)).unwrap();
        }
        Arc::new(kv)
    }

    #[test]
    fn shared_link_claims_identifier() {
        let kv = kv_with_id(Some("old-id"));
        let identity = Identity::resolve(
            Arc::clone(&kv),
            Some("https://love.example/?couple=abc-123"),
        );

        assert_eq!(identity.couple_id(), Some(CoupleId::from("abc-123")));
        assert!(identity.is_shared_view());
        assert_eq!(kv.get(COUPLE_ID_KEY).unwrap().as_deref(), Some("\"abc-123\""));
    }

    #[test]
    fn falls_back_to_persisted_identifier() {
        let identity = Identity::resolve(kv_with_id(Some("saved")), Some("https://love.example/"));
        assert_eq!(identity.couple_id(), Some(CoupleId::from("saved")));
        assert!(!identity.is_shared_view());
    }

    #[test]
    fn no_identifier_anywhere() {
        let identity = Identity::resolve(kv_with_id(None), None);
        assert_eq!(identity.couple_id(), None);
        assert!(!identity.is_shared_view());
    }

    #[test]
    fn empty_param_is_not_a_shared_view() {
        let identity = Identity::resolve(kv_with_id(Some("saved")), Some("?couple="));
        assert_eq!(identity.couple_id(), Some(CoupleId::from("saved")));
        assert!(!identity.is_shared_view());
    }

    #[test]
    fn bare_query_string_is_accepted() {
        let identity = Identity::resolve(kv_with_id(None), Some("?lang=en&couple=xyz"));
        assert_eq!(identity.couple_id(), Some(CoupleId::from("xyz")));
        assert!(identity.is_shared_view());
    }

    #[test]
    fn set_persists_and_publishes() {
        let kv = kv_with_id(None);
        let identity = Identity::resolve(Arc::clone(&kv), None);
        let rx = identity.subscribe();

        identity.set(CoupleId::from("fresh")).unwrap();

        assert_eq!(identity.couple_id(), Some(CoupleId::from("fresh")));
        assert_eq!(*rx.borrow(), Some(CoupleId::from("fresh")));
        let reloaded = Identity::resolve(kv, None);
        assert_eq!(reloaded.couple_id(), Some(CoupleId::from("fresh")));
        assert!(!identity.is_shared_view());
    }

    #[test]
    fn share_link_replaces_query_and_fragment() {
        let link = share_link(
            "https://love.example/app?couple=old&x=1#gift",
            Some(&CoupleId::from("abc")),
        )
        .unwrap();
        assert_eq!(link, "https://love.example/app?couple=abc");
    }

    #[test]
    fn share_link_without_identifier_is_bare_base() {
        let link = share_link("https://love.example/app?x=1", None).unwrap();
        assert_eq!(link, "https://love.example/app");
    }

    #[test]
    fn share_link_rejects_relative_base() {
        assert!(matches!(
            share_link("not a url", None),
            Err(KeepsakeError::Invalid(_))
        ));
    }

    #[test]
    fn shared_link_round_trips_through_identity() {
        let owner = Identity::resolve(kv_with_id(Some("abc")), None);
        let link = owner.share_link("https://love.example/").unwrap();

        let guest = Identity::resolve(kv_with_id(None), Some(&link));
        assert_eq!(guest.couple_id(), owner.couple_id());
        assert!(guest.is_shared_view());
    }
}
