use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};

use crate::api::types::{
    asset_path, Asset, CreatedRow, InsertRow, RemoteRecord, UpdateRow, COUPLES_TABLE,
};
use crate::error::{KeepsakeError, Result};
use crate::state::CoupleId;

/// Talks to a Supabase project: PostgREST for rows, Storage for assets.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str, bucket: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
        }
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, COUPLES_TABLE)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    pub async fn create_couple(&self, data: &serde_json::Value) -> Result<CoupleId> {
        let resp = self
            .authorized(self.client.post(self.table_url()))
            .query(&[("select", "id")])
            .header("Prefer", "return=representation")
            .json(&InsertRow { data })
            .send()
            .await?;
        let rows = ensure_success(resp).await?.json::<Vec<CreatedRow>>().await?;
        rows.first()
            .ok_or_else(|| KeepsakeError::NotFound("created couple row".into()))?
            .couple_id()
    }

    pub async fn load_couple(&self, id: &CoupleId) -> Result<RemoteRecord> {
        let filter = format!("eq.{}", id);
        let resp = self
            .authorized(self.client.get(self.table_url()))
            .query(&[("select", "data,updated_at"), ("id", filter.as_str())])
            .send()
            .await?;
        let mut rows = ensure_success(resp).await?.json::<Vec<RemoteRecord>>().await?;
        if rows.is_empty() {
            return Err(KeepsakeError::NotFound(format!("couple {}", id)));
        }
        Ok(rows.swap_remove(0))
    }

    /// PostgREST answers a PATCH that matched nothing with success, so the
    /// touched rows are echoed back and an empty echo means the row is gone.
    pub async fn save_couple(&self, id: &CoupleId, data: &serde_json::Value) -> Result<()> {
        let filter = format!("eq.{}", id);
        let resp = self
            .authorized(self.client.patch(self.table_url()))
            .query(&[("id", filter.as_str()), ("select", "id")])
            .header("Prefer", "return=representation")
            .json(&UpdateRow {
                data,
                updated_at: Utc::now(),
            })
            .send()
            .await?;
        let rows = ensure_success(resp).await?.json::<Vec<CreatedRow>>().await?;
        if rows.is_empty() {
            return Err(KeepsakeError::NotFound(format!("couple {}", id)));
        }
        Ok(())
    }

    pub async fn upload_photo(&self, id: &CoupleId, asset: &Asset, purpose: &str) -> Result<String> {
        let path = asset_path(id, purpose, asset, Utc::now())?;
        let resp = self
            .authorized(self.client.post(format!(
                "{}/storage/v1/object/{}/{}",
                self.base_url, self.bucket, path
            )))
            .header("cache-control", "3600")
            .header("x-upsert", "false")
            .header("content-type", asset.content_type())
            .body(asset.bytes.clone())
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(self.public_url(&path))
    }
}

async fn ensure_success(resp: Response) -> Result<Response> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        return Err(KeepsakeError::Api { status, message });
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, SupabaseClient) {
        let server = MockServer::start().await;
        let client = SupabaseClient::new(&server.uri(), "anon-key", "couple-photos");
        (server, client)
    }

    #[tokio::test]
    async fn create_inserts_row_and_returns_id() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/couples"))
            .and(query_param("select", "id"))
            .and(header("apikey", "anon-key"))
            .and(header("Authorization", "Bearer anon-key"))
            .and(header("Prefer", "return=representation"))
            .and(body_json(json!({"data": {"partner1": "Ana"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": "c0ffee"}])))
            .mount(&server)
            .await;

        let id = client.create_couple(&json!({"partner1": "Ana"})).await.unwrap();
        assert_eq!(id, CoupleId::from("c0ffee"));
    }

    #[tokio::test]
    async fn create_with_empty_representation_fails() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/couples"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .mount(&server)
            .await;

        let err = client.create_couple(&json!({})).await.unwrap_err();
        assert!(matches!(err, KeepsakeError::NotFound(_)));
    }

    #[tokio::test]
    async fn load_filters_by_id() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/couples"))
            .and(query_param("select", "data,updated_at"))
            .and(query_param("id", "eq.c0ffee"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "data": {"partner2": "Ben"},
                "updated_at": "2025-02-14T09:30:00+00:00"
            }])))
            .mount(&server)
            .await;

        let record = client.load_couple(&CoupleId::from("c0ffee")).await.unwrap();
        assert_eq!(record.data["partner2"], "Ben");
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn load_missing_row_is_not_found() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/couples"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let err = client.load_couple(&CoupleId::from("nope")).await.unwrap_err();
        assert!(matches!(err, KeepsakeError::NotFound(_)));
    }

    #[tokio::test]
    async fn save_patches_data_and_timestamp() {
        let (server, client) = setup().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/couples"))
            .and(query_param("id", "eq.c0ffee"))
            .and(query_param("select", "id"))
            .and(header("apikey", "anon-key"))
            .and(header("Prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "c0ffee"}])))
            .expect(1)
            .mount(&server)
            .await;

        client
            .save_couple(&CoupleId::from("c0ffee"), &json!({"partner1": "Ana"}))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["data"]["partner1"], "Ana");
        assert!(body["updated_at"].is_string());
    }

    #[tokio::test]
    async fn save_matching_no_row_is_not_found() {
        let (server, client) = setup().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/couples"))
            .and(query_param("id", "eq.deleted"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let err = client
            .save_couple(&CoupleId::from("deleted"), &json!({"partner1": "Ana"}))
            .await
            .unwrap_err();
        assert!(matches!(err, KeepsakeError::NotFound(_)));
    }

    #[tokio::test]
    async fn save_returns_api_error_on_401() {
        let (server, client) = setup().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/couples"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid API key"})),
            )
            .mount(&server)
            .await;

        let err = client
            .save_couple(&CoupleId::from("c0ffee"), &json!({}))
            .await
            .unwrap_err();
        match err {
            KeepsakeError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("Invalid API key"));
            }
            other => panic!("Expected Api error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn upload_stores_under_couple_path_and_returns_public_url() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/couple-photos/c0ffee/gift_\d+\.png$"))
            .and(header("x-upsert", "false"))
            .and(header("content-type", "image/png"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "ok"})))
            .mount(&server)
            .await;

        let url = client
            .upload_photo(
                &CoupleId::from("c0ffee"),
                &Asset::new("bow.png", vec![1, 2, 3]),
                "gift",
            )
            .await
            .unwrap();

        let prefix = format!("{}/storage/v1/object/public/couple-photos/c0ffee/gift_", server.uri());
        assert!(url.starts_with(&prefix), "unexpected url {}", url);
        assert!(url.ends_with(".png"));
    }

    #[tokio::test]
    async fn upload_escapes_identifier_in_object_path() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/couple-photos/a%2Fb%3Fc/photo_\d+\.png$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let url = client
            .upload_photo(&CoupleId::from("a/b?c"), &Asset::new("us.png", vec![1]), "photo")
            .await
            .unwrap();
        assert!(url.contains("/couple-photos/a%2Fb%3Fc/photo_"), "unexpected url {}", url);
    }

    #[tokio::test]
    async fn upload_conflict_is_api_error() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/.*"))
            .respond_with(ResponseTemplate::new(409).set_body_string("Duplicate"))
            .mount(&server)
            .await;

        let err = client
            .upload_photo(&CoupleId::from("c0ffee"), &Asset::new("a.jpg", vec![]), "photo")
            .await
            .unwrap_err();
        assert!(matches!(err, KeepsakeError::Api { status: 409, .. }));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = SupabaseClient::new("https://proj.supabase.co/", "k", "b");
        assert_eq!(
            client.public_url("x/y.png"),
            "https://proj.supabase.co/storage/v1/object/public/b/x/y.png"
        );
    }
}
