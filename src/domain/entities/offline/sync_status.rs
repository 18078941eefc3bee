use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// UIへ配信する同期状態。永続化しない。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending_mutations: u64,
    pub pending_photos: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SyncStatus {
    pub fn new(is_online: bool) -> Self {
        Self {
            is_online,
            is_syncing: false,
            pending_mutations: 0,
            pending_photos: 0,
            last_sync_at: None,
            error: None,
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::new(true)
    }
}
