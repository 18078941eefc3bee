use serde::{Deserialize, Serialize};
use std::fmt;

/// 端末ローカルストアのコレクション名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreCollection {
    StockItems,
    JobCards,
    DeliveryNotes,
    Photos,
    PendingActions,
    SyncMeta,
    FailedActions,
}

impl StoreCollection {
    pub const ALL: [StoreCollection; 7] = [
        StoreCollection::StockItems,
        StoreCollection::JobCards,
        StoreCollection::DeliveryNotes,
        StoreCollection::Photos,
        StoreCollection::PendingActions,
        StoreCollection::SyncMeta,
        StoreCollection::FailedActions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreCollection::StockItems => "stockItems",
            StoreCollection::JobCards => "jobCards",
            StoreCollection::DeliveryNotes => "deliveryNotes",
            StoreCollection::Photos => "photos",
            StoreCollection::PendingActions => "pendingActions",
            StoreCollection::SyncMeta => "syncMeta",
            StoreCollection::FailedActions => "failedActions",
        }
    }
}

impl fmt::Display for StoreCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// サーバーから取得した読み取りキャッシュのコレクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheCollection {
    StockItems,
    JobCards,
    DeliveryNotes,
}

impl CacheCollection {
    pub const ALL: [CacheCollection; 3] = [
        CacheCollection::StockItems,
        CacheCollection::JobCards,
        CacheCollection::DeliveryNotes,
    ];

    pub fn as_str(&self) -> &'static str {
        self.store().as_str()
    }

    pub fn store(&self) -> StoreCollection {
        match self {
            CacheCollection::StockItems => StoreCollection::StockItems,
            CacheCollection::JobCards => StoreCollection::JobCards,
            CacheCollection::DeliveryNotes => StoreCollection::DeliveryNotes,
        }
    }

    /// 変更リクエストの entity_type からキャッシュ先を引く
    pub fn from_entity_type(entity_type: &str) -> Option<Self> {
        match entity_type.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "stockitem" | "stockitems" | "inventory" | "inventoryitem" => {
                Some(CacheCollection::StockItems)
            }
            "jobcard" | "jobcards" => Some(CacheCollection::JobCards),
            "deliverynote" | "deliverynotes" | "delivery" | "deliveries" => {
                Some(CacheCollection::DeliveryNotes)
            }
            _ => None,
        }
    }
}

impl From<CacheCollection> for StoreCollection {
    fn from(value: CacheCollection) -> Self {
        value.store()
    }
}

impl fmt::Display for CacheCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_entity_types_to_cache_collections() {
        assert_eq!(
            CacheCollection::from_entity_type("job-card"),
            Some(CacheCollection::JobCards)
        );
        assert_eq!(
            CacheCollection::from_entity_type("StockItem"),
            Some(CacheCollection::StockItems)
        );
        assert_eq!(CacheCollection::from_entity_type("photo"), None);
    }

    #[test]
    fn collection_names_match_persisted_layout() {
        let names: Vec<&str> = StoreCollection::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "stockItems",
                "jobCards",
                "deliveryNotes",
                "photos",
                "pendingActions",
                "syncMeta",
                "failedActions"
            ]
        );
    }
}
