use crate::domain::value_objects::CacheCollection;
use serde::{Deserialize, Serialize};

pub const SYNC_IN_PROGRESS: &str = "Sync already in progress";

/// 変更キュー1回分の消化結果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub dead_lettered: u32,
    pub deferred: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoSyncReport {
    pub synced: u32,
    pub failed: u32,
    pub deferred: u32,
    pub dead_lettered: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub collection: CacheCollection,
    pub items: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub mutations: DrainReport,
    pub photos: PhotoSyncReport,
    pub refreshed: Vec<RefreshReport>,
}

impl SyncReport {
    pub fn refresh_failures(&self) -> usize {
        self.refreshed.iter().filter(|r| r.error.is_some()).count()
    }
}

/// `sync_data` の戻り値
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub report: Option<SyncReport>,
}

impl SyncOutcome {
    pub fn completed(report: SyncReport) -> Self {
        Self {
            success: true,
            error: None,
            report: Some(report),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            report: None,
        }
    }

    pub fn already_in_progress() -> Self {
        Self::failed(SYNC_IN_PROGRESS)
    }
}
