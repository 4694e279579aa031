use chrono::{DateTime, Utc};

use crate::error::{ErrorInfo, SyncNotice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Loading,
    Saving,
}

/// What a status indicator shows about the cloud mirror.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// A local change is waiting for its debounced push.
    pub pending: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorInfo>,
}

impl SyncStatus {
    pub fn is_settled(&self) -> bool {
        self.phase == SyncPhase::Idle && !self.pending
    }

    pub fn notice(&self) -> Option<SyncNotice> {
        self.last_error.as_ref().map(SyncNotice::from_error_info)
    }

    pub fn label(&self) -> String {
        match (self.phase, &self.last_error) {
            (SyncPhase::Loading, _) => "loading from cloud".into(),
            (SyncPhase::Saving, _) => "saving to cloud".into(),
            (SyncPhase::Idle, _) if self.pending => "changes pending".into(),
            (SyncPhase::Idle, Some(_)) => "sync failed, local only".into(),
            (SyncPhase::Idle, None) => match self.last_synced_at {
                Some(at) => format!("synced {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => "not synced yet".into(),
            },
        }
    }
}
