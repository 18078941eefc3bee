use crate::domain::value_objects::CacheCollection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    pub collection: CacheCollection,
    pub last_sync: Option<DateTime<Utc>>,
    pub version: String,
}

impl SyncMeta {
    pub fn synced_now(collection: CacheCollection, version: impl Into<String>) -> Self {
        Self {
            collection,
            last_sync: Some(Utc::now()),
            version: version.into(),
        }
    }
}
