use crate::application::ports::offline_store::{Collection, OfflineStore};
use crate::domain::entities::offline::{DeadLetter, DeadLetterEntry};
use crate::domain::value_objects::StoreCollection;
use crate::shared::error::AppError;
use std::sync::Arc;
use tracing::warn;

/// `failedActions` コレクション。両キューが共有する。
#[derive(Clone)]
pub struct DeadLetterBox {
    letters: Collection<DeadLetter>,
}

impl DeadLetterBox {
    pub fn new(store: Arc<dyn OfflineStore>) -> Self {
        Self {
            letters: Collection::new(store, StoreCollection::FailedActions),
        }
    }

    pub async fn archive(
        &self,
        entry: DeadLetterEntry,
        reason: &str,
        last_error: Option<String>,
    ) -> Result<DeadLetter, AppError> {
        let letter = DeadLetter::new(entry, reason, last_error);
        self.letters.save(&letter).await?;
        warn!(
            target: "offline::dead_letters",
            id = %letter.id,
            reason = %letter.reason,
            last_error = letter.last_error.as_deref().unwrap_or(""),
            "entry moved to dead letters"
        );
        Ok(letter)
    }

    pub async fn list(&self) -> Result<Vec<DeadLetter>, AppError> {
        self.letters.all().await
    }

    pub async fn get(&self, id: &str) -> Result<Option<DeadLetter>, AppError> {
        self.letters.by_id(id).await
    }

    pub async fn contains(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.letters.by_id(id).await?.is_some())
    }

    /// 取り出して削除する（再送用）
    pub async fn take(&self, id: &str) -> Result<Option<DeadLetter>, AppError> {
        let Some(letter) = self.letters.by_id(id).await? else {
            return Ok(None);
        };
        self.letters.remove(id).await?;
        Ok(Some(letter))
    }

    pub async fn discard(&self, id: &str) -> Result<bool, AppError> {
        self.letters.remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::offline::{MAX_RETRIES_EXCEEDED, QueuedMutation};
    use crate::domain::value_objects::{HttpMethod, MutationId, MutationKind};
    use crate::infrastructure::offline::{ConnectionPool, SqliteOfflineStore};
    use std::collections::BTreeMap;

    async fn setup_box() -> DeadLetterBox {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        DeadLetterBox::new(Arc::new(SqliteOfflineStore::new(pool)))
    }

    fn mutation(id: &str) -> QueuedMutation {
        QueuedMutation {
            id: MutationId::parse(id).unwrap(),
            url: "https://api.example.com/stock-control/inventory/1".into(),
            method: HttpMethod::Put,
            headers: BTreeMap::new(),
            body: Some("{}".into()),
            timestamp: 1,
            retry_count: 6,
            action: MutationKind::Update,
            entity_type: "stock_item".into(),
            entity_id: Some("1".into()),
            last_error: Some("HTTP 500".into()),
            next_attempt_at: None,
        }
    }

    #[tokio::test]
    async fn test_archive_take_and_discard() {
        let letters = setup_box().await;

        letters
            .archive(
                DeadLetterEntry::Mutation(mutation("m-1")),
                MAX_RETRIES_EXCEEDED,
                Some("HTTP 500".into()),
            )
            .await
            .unwrap();
        letters
            .archive(
                DeadLetterEntry::Mutation(mutation("m-2")),
                MAX_RETRIES_EXCEEDED,
                None,
            )
            .await
            .unwrap();

        let listed = letters.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "m-1");
        assert_eq!(listed[0].reason, MAX_RETRIES_EXCEEDED);

        let taken = letters.take("m-1").await.unwrap().unwrap();
        assert!(matches!(taken.entry, DeadLetterEntry::Mutation(_)));
        assert!(!letters.contains("m-1").await.unwrap());
        assert!(letters.take("m-1").await.unwrap().is_none());

        assert!(letters.discard("m-2").await.unwrap());
        assert!(letters.list().await.unwrap().is_empty());
    }
}
