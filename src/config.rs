use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::api::types::DEFAULT_BUCKET;
use crate::error::{KeepsakeError, Result};
use crate::state::FileStore;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CloudConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            bucket: default_bucket(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.into()
}

fn default_debounce_ms() -> u64 {
    500
}

impl AppConfig {
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("KEEPSAKE_").split("__"))
            .extract()
            .map_err(|e| KeepsakeError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.cloud.url.is_empty() {
            let url = url::Url::parse(&self.cloud.url)
                .map_err(|e| KeepsakeError::Config(format!("cloud.url is not a URL: {}", e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(KeepsakeError::Config(
                    "cloud.url must be an http(s) URL".into(),
                ));
            }
        }
        if self.cloud.bucket.trim().is_empty() {
            return Err(KeepsakeError::Config("cloud.bucket must not be empty".into()));
        }
        Ok(())
    }

    /// Cloud sync runs only with both a project URL and an anon key.
    pub fn cloud_enabled(&self) -> bool {
        !self.cloud.url.trim().is_empty() && !self.cloud.anon_key.trim().is_empty()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.sync.debounce_ms)
    }

    pub fn data_dir(&self) -> Option<PathBuf> {
        self.storage.data_dir.clone().or_else(FileStore::default_dir)
    }

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(|xdg| PathBuf::from(xdg).join("keepsake"))
            .or_else(|| {
                directories::BaseDirs::new()
                    .map(|dirs| dirs.home_dir().join(".config").join("keepsake"))
            })
    }

    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = r#"# Leave url or anon_key empty to keep everything on this device.
[cloud]
url = ""       # https://<project>.supabase.co
anon_key = ""  # or set KEEPSAKE_CLOUD__ANON_KEY
bucket = "couple-photos"

[sync]
debounce_ms = 500

[storage]
# data_dir = "/path/to/keepsake-data"
"#;

        std::fs::write(path, content)?;
        Ok(())
    }
}
