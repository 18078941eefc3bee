use crate::domain::value_objects::{MutationId, PhotoId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 圧縮済みでアップロード待ちの写真
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingPhoto {
    pub id: PhotoId,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(with = "blob_base64")]
    pub blob: Vec<u8>,
    pub filename: String,
    pub content_type: String,
    pub upload_url: String,
    #[serde(default)]
    pub auth_header: Option<String>,
    #[serde(default)]
    pub synced: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    /// 先に送るべき変更キューのエントリ
    #[serde(default)]
    pub depends_on: Option<MutationId>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

// blob 本体をログに出さない
impl fmt::Debug for PendingPhoto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingPhoto")
            .field("id", &self.id)
            .field("entity_type", &self.entity_type)
            .field("entity_id", &self.entity_id)
            .field("blob_len", &self.blob.len())
            .field("filename", &self.filename)
            .field("upload_url", &self.upload_url)
            .field("synced", &self.synced)
            .field("attempts", &self.attempts)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// 撮影直後の写真をキューへ積むための入力
#[derive(Clone)]
pub struct PhotoUploadRequest {
    pub entity_type: String,
    pub entity_id: String,
    pub file: Vec<u8>,
    pub filename: String,
    pub upload_url: String,
    pub auth_header: Option<String>,
    pub depends_on: Option<MutationId>,
}

impl fmt::Debug for PhotoUploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoUploadRequest")
            .field("entity_type", &self.entity_type)
            .field("entity_id", &self.entity_id)
            .field("file_len", &self.file.len())
            .field("filename", &self.filename)
            .field("upload_url", &self.upload_url)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

mod blob_base64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
