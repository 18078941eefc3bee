use crate::domain::entities::offline::{DeadLetter, PendingPhoto, QueuedMutation, SyncMeta};
use crate::domain::value_objects::StoreCollection;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// 端末上の永続キー/バリューストア。ネットワークは一切知らない。
///
/// 値は JSON 文字列で受け渡し、型付けは [`Collection`] が担う。
/// `list` は最初に挿入された順で返し、既存キーの上書きでは順序が変わらない。
#[async_trait]
pub trait OfflineStore: Send + Sync {
    async fn get(
        &self,
        collection: StoreCollection,
        key: &str,
    ) -> Result<Option<String>, AppError>;
    async fn put(
        &self,
        collection: StoreCollection,
        key: &str,
        payload: &str,
    ) -> Result<(), AppError>;
    /// 1コレクション内で原子的に一括 upsert する
    async fn put_many(
        &self,
        collection: StoreCollection,
        entries: Vec<(String, String)>,
    ) -> Result<(), AppError>;
    async fn delete(&self, collection: StoreCollection, key: &str) -> Result<bool, AppError>;
    async fn list(&self, collection: StoreCollection) -> Result<Vec<String>, AppError>;
    async fn count(&self, collection: StoreCollection) -> Result<u64, AppError>;
    /// 最上位の真偽値フィールドが `value` のレコード数。フィールドが無ければ false とみなす
    async fn count_flag(
        &self,
        collection: StoreCollection,
        field: &str,
        value: bool,
    ) -> Result<u64, AppError>;
}

/// コレクションに保存できるレコード
pub trait StoreRecord: Serialize + DeserializeOwned + Send + Sync {
    fn record_key(&self) -> Result<String, AppError>;
}

/// 1つの名前付きコレクションへの型付きハンドル
pub struct Collection<T> {
    store: Arc<dyn OfflineStore>,
    name: StoreCollection,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            name: self.name,
            _record: PhantomData,
        }
    }
}

impl<T: StoreRecord> Collection<T> {
    pub fn new(store: Arc<dyn OfflineStore>, name: StoreCollection) -> Self {
        Self {
            store,
            name,
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> StoreCollection {
        self.name
    }

    pub async fn by_id(&self, id: &str) -> Result<Option<T>, AppError> {
        self.store
            .get(self.name, id)
            .await?
            .map(|payload| decode(self.name, &payload))
            .transpose()
    }

    pub async fn save(&self, item: &T) -> Result<(), AppError> {
        let key = item.record_key()?;
        let payload = encode(item)?;
        self.store.put(self.name, &key, &payload).await
    }

    pub async fn save_all(&self, items: &[T]) -> Result<usize, AppError> {
        let entries = items
            .iter()
            .map(|item| Ok((item.record_key()?, encode(item)?)))
            .collect::<Result<Vec<_>, AppError>>()?;
        let written = entries.len();
        self.store.put_many(self.name, entries).await?;
        Ok(written)
    }

    pub async fn remove(&self, id: &str) -> Result<bool, AppError> {
        self.store.delete(self.name, id).await
    }

    pub async fn all(&self) -> Result<Vec<T>, AppError> {
        self.store
            .list(self.name)
            .await?
            .iter()
            .map(|payload| decode(self.name, payload))
            .collect()
    }

    pub async fn count(&self) -> Result<u64, AppError> {
        self.store.count(self.name).await
    }

    /// 本体をデコードせずに数える
    pub async fn count_where(&self, field: &str, value: bool) -> Result<u64, AppError> {
        self.store.count_flag(self.name, field, value).await
    }
}

fn encode<T: Serialize>(item: &T) -> Result<String, AppError> {
    serde_json::to_string(item).map_err(|err| AppError::SerializationError(err.to_string()))
}

fn decode<T: DeserializeOwned>(collection: StoreCollection, payload: &str) -> Result<T, AppError> {
    serde_json::from_str(payload).map_err(|err| {
        AppError::DeserializationError(format!("Corrupted record in {collection}: {err}"))
    })
}

impl StoreRecord for QueuedMutation {
    fn record_key(&self) -> Result<String, AppError> {
        Ok(self.id.to_string())
    }
}

impl StoreRecord for PendingPhoto {
    fn record_key(&self) -> Result<String, AppError> {
        Ok(self.id.to_string())
    }
}

impl StoreRecord for SyncMeta {
    fn record_key(&self) -> Result<String, AppError> {
        Ok(self.collection.as_str().to_string())
    }
}

impl StoreRecord for DeadLetter {
    fn record_key(&self) -> Result<String, AppError> {
        Ok(self.id.clone())
    }
}

/// サーバー形式のキャッシュレコード。`id` を文字列化したものがキーになる。
impl StoreRecord for Value {
    fn record_key(&self) -> Result<String, AppError> {
        entity_key(self).ok_or_else(|| {
            AppError::ValidationError("Cached entity has no usable `id` field".to_string())
        })
    }
}

pub fn entity_key(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        _ => None,
    }
}
