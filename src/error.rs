use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeepsakeError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, KeepsakeError>;

/// Cloneable error summary carried in the sync status
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorInfo {
    Api { status: u16, body: String },
    Network(String),
    Storage(String),
}

impl ErrorInfo {
    pub fn from_error(e: &KeepsakeError) -> Self {
        match e {
            KeepsakeError::Api { status, message } => ErrorInfo::Api {
                status: *status,
                body: message.clone(),
            },
            KeepsakeError::NotFound(what) => ErrorInfo::Api {
                status: 404,
                body: what.clone(),
            },
            KeepsakeError::Io(_) | KeepsakeError::Json(_) => ErrorInfo::Storage(e.to_string()),
            _ => ErrorInfo::Network(e.to_string()),
        }
    }
}

/// Ready-to-display sync problem
#[derive(Debug, Clone, PartialEq)]
pub struct SyncNotice {
    pub title: String,
    pub message: String,
    pub hint: String,
}

impl SyncNotice {
    pub fn from_error_info(info: &ErrorInfo) -> Self {
        match info {
            ErrorInfo::Api { status, body } => Self::from_api(*status, body),
            ErrorInfo::Network(msg) => Self {
                title: "Offline".into(),
                message: truncate(msg, 80),
                hint: "Changes are kept on this device".into(),
            },
            ErrorInfo::Storage(msg) => Self {
                title: "Save Failed".into(),
                message: truncate(msg, 80),
                hint: "Your changes may not survive a restart".into(),
            },
        }
    }

    fn from_api(status: u16, body: &str) -> Self {
        let extracted_message = extract_json_message(body);

        match status {
            401 | 403 => Self {
                title: "Cloud Access Denied".into(),
                message: extracted_message.unwrap_or_else(|| "Invalid anon key".into()),
                hint: "Check cloud.anon_key in config.toml".into(),
            },
            404 => Self {
                title: "Not Found".into(),
                message: extracted_message.unwrap_or_else(|| "No such couple".into()),
                hint: "Check the shared link".into(),
            },
            429 => Self {
                title: "Rate Limited".into(),
                message: extracted_message.unwrap_or_else(|| "Too many requests".into()),
                hint: "Your next change will sync again".into(),
            },
            _ => Self {
                title: format!("Cloud Error ({})", status),
                message: extracted_message.unwrap_or_else(|| truncate(body, 200)),
                hint: "Changes are kept on this device".into(),
            },
        }
    }
}

// PostgREST puts the text in "message", storage in "error"
fn extract_json_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
