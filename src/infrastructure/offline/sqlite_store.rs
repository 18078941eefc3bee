use super::connection_pool::ConnectionPool;
use super::queries::{
    COUNT_BY_FLAG, COUNT_COLLECTION, DELETE_RECORD, SELECT_COLLECTION, SELECT_RECORD,
    UPSERT_RECORD,
};
use crate::application::ports::offline_store::OfflineStore;
use crate::domain::value_objects::StoreCollection;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;

/// SQLite の `offline_records` テーブルに全コレクションを載せるストア
#[derive(Clone)]
pub struct SqliteOfflineStore {
    pool: ConnectionPool,
}

impl SqliteOfflineStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfflineStore for SqliteOfflineStore {
    async fn get(
        &self,
        collection: StoreCollection,
        key: &str,
    ) -> Result<Option<String>, AppError> {
        let payload = sqlx::query_scalar::<_, String>(SELECT_RECORD)
            .bind(collection.as_str())
            .bind(key)
            .fetch_optional(self.pool.get_pool())
            .await?;
        Ok(payload)
    }

    async fn put(
        &self,
        collection: StoreCollection,
        key: &str,
        payload: &str,
    ) -> Result<(), AppError> {
        sqlx::query(UPSERT_RECORD)
            .bind(collection.as_str())
            .bind(key)
            .bind(payload)
            .bind(Utc::now().timestamp_millis())
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn put_many(
        &self,
        collection: StoreCollection,
        entries: Vec<(String, String)>,
    ) -> Result<(), AppError> {
        if entries.is_empty() {
            return Ok(());
        }

        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.get_pool().begin().await?;
        for (key, payload) in &entries {
            sqlx::query(UPSERT_RECORD)
                .bind(collection.as_str())
                .bind(key)
                .bind(payload)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, collection: StoreCollection, key: &str) -> Result<bool, AppError> {
        let result = sqlx::query(DELETE_RECORD)
            .bind(collection.as_str())
            .bind(key)
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, collection: StoreCollection) -> Result<Vec<String>, AppError> {
        let payloads = sqlx::query_scalar::<_, String>(SELECT_COLLECTION)
            .bind(collection.as_str())
            .fetch_all(self.pool.get_pool())
            .await?;
        Ok(payloads)
    }

    async fn count(&self, collection: StoreCollection) -> Result<u64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(COUNT_COLLECTION)
            .bind(collection.as_str())
            .fetch_one(self.pool.get_pool())
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn count_flag(
        &self,
        collection: StoreCollection,
        field: &str,
        value: bool,
    ) -> Result<u64, AppError> {
        // SQLite の json_extract は真偽値を 1/0 で返す
        let count = sqlx::query_scalar::<_, i64>(COUNT_BY_FLAG)
            .bind(collection.as_str())
            .bind(field)
            .bind(i64::from(value))
            .fetch_one(self.pool.get_pool())
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::config::DatabaseConfig;

    async fn setup_store() -> SqliteOfflineStore {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        SqliteOfflineStore::new(pool)
    }

    #[tokio::test]
    async fn test_upsert_keeps_insertion_order() {
        let store = setup_store().await;
        let collection = StoreCollection::PendingActions;

        store.put(collection, "a", r#"{"v":1}"#).await.unwrap();
        store.put(collection, "b", r#"{"v":2}"#).await.unwrap();
        store.put(collection, "a", r#"{"v":3}"#).await.unwrap();

        let payloads = store.list(collection).await.unwrap();
        assert_eq!(payloads, vec![r#"{"v":3}"#, r#"{"v":2}"#]);
        assert_eq!(store.count(collection).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = setup_store().await;

        store
            .put(StoreCollection::StockItems, "1", "{}")
            .await
            .unwrap();

        assert!(
            store
                .get(StoreCollection::JobCards, "1")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(store.count(StoreCollection::JobCards).await.unwrap(), 0);
        assert_eq!(store.count(StoreCollection::StockItems).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let store = setup_store().await;
        let collection = StoreCollection::Photos;

        store.put(collection, "p1", "{}").await.unwrap();
        assert!(store.delete(collection, "p1").await.unwrap());
        assert!(!store.delete(collection, "p1").await.unwrap());
        assert!(store.get(collection, "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_many_upserts_batch() {
        let store = setup_store().await;
        let collection = StoreCollection::StockItems;

        store.put(collection, "2", r#"{"id":2}"#).await.unwrap();
        store
            .put_many(
                collection,
                vec![
                    ("1".to_string(), r#"{"id":1}"#.to_string()),
                    ("2".to_string(), r#"{"id":2,"qty":5}"#.to_string()),
                ],
            )
            .await
            .unwrap();

        let payloads = store.list(collection).await.unwrap();
        assert_eq!(payloads, vec![r#"{"id":2,"qty":5}"#, r#"{"id":1}"#]);
    }

    #[tokio::test]
    async fn test_count_flag_reads_boolean_field() {
        let store = setup_store().await;
        let collection = StoreCollection::Photos;

        store
            .put(collection, "p1", r#"{"id":"p1","synced":false,"blob":"AAAA"}"#)
            .await
            .unwrap();
        store
            .put(collection, "p2", r#"{"id":"p2","synced":true,"blob":"AAAA"}"#)
            .await
            .unwrap();
        store.put(collection, "p3", r#"{"id":"p3"}"#).await.unwrap();
        store
            .put(StoreCollection::PendingActions, "m1", r#"{"synced":false}"#)
            .await
            .unwrap();

        assert_eq!(store.count_flag(collection, "synced", false).await.unwrap(), 2);
        assert_eq!(store.count_flag(collection, "synced", true).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
        };

        {
            let pool = ConnectionPool::new(&config).await.unwrap();
            pool.migrate().await.unwrap();
            let store = SqliteOfflineStore::new(pool.clone());
            store
                .put(StoreCollection::PendingActions, "m1", r#"{"id":"m1"}"#)
                .await
                .unwrap();
            pool.close().await;
        }

        let pool = ConnectionPool::new(&config).await.unwrap();
        pool.migrate().await.unwrap();
        let store = SqliteOfflineStore::new(pool);
        let payload = store
            .get(StoreCollection::PendingActions, "m1")
            .await
            .unwrap();
        assert_eq!(payload.as_deref(), Some(r#"{"id":"m1"}"#));
    }
}
