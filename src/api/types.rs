use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{KeepsakeError, Result};
use crate::state::CoupleId;

/// Table holding one row per couple.
pub const COUPLES_TABLE: &str = "couples";
pub const DEFAULT_BUCKET: &str = "couple-photos";

/// A couple's row as read back from the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteRecord {
    pub data: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct InsertRow<'a> {
    pub data: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct UpdateRow<'a> {
    pub data: &'a serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreatedRow {
    pub id: serde_json::Value,
}

impl CreatedRow {
    /// Row ids may be uuids or serial integers.
    pub fn couple_id(&self) -> Result<CoupleId> {
        match &self.id {
            serde_json::Value::String(s) if !s.is_empty() => Ok(CoupleId(s.clone())),
            serde_json::Value::Number(n) => Ok(CoupleId(n.to_string())),
            other => Err(KeepsakeError::Invalid(format!("unexpected row id {}", other))),
        }
    }
}

/// A binary file on its way to asset storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Asset {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("asset")
            .to_string();
        Ok(Self { file_name, bytes })
    }

    pub fn extension(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .unwrap_or("bin")
    }

    pub fn content_type(&self) -> &'static str {
        match self.extension().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "heic" => "image/heic",
            "svg" => "image/svg+xml",
            _ => "application/octet-stream",
        }
    }

    /// Inline representation used when the asset cannot be uploaded.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type(),
            BASE64_STANDARD.encode(&self.bytes)
        )
    }
}

/// `<couple>/<purpose>_<unix ms>.<ext>`, each segment percent-encoded.
pub fn asset_path(
    id: &CoupleId,
    purpose: &str,
    asset: &Asset,
    at: DateTime<Utc>,
) -> Result<String> {
    let file = format!("{}_{}.{}", purpose, at.timestamp_millis(), asset.extension());
    Ok(format!(
        "{}/{}",
        path_segment(id.as_str())?,
        path_segment(&file)?
    ))
}

/// Identifiers arrive through shared links, so `/`, `?` and `#` must not
/// reach the object path unescaped.
fn path_segment(raw: &str) -> Result<String> {
    if raw.is_empty() || raw == "." || raw == ".." {
        return Err(KeepsakeError::Invalid(format!(
            "unusable storage path segment {:?}",
            raw
        )));
    }
    let mut url = Url::parse("http://segment.invalid")
        .map_err(|e| KeepsakeError::Invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| KeepsakeError::Invalid("storage path base".into()))?
        .pop_if_empty()
        .push(raw);
    Ok(url.path().trim_start_matches('/').to_string())
}
