use super::dead_letters::DeadLetterBox;
use crate::application::ports::deferred_wake::DeferredWake;
use crate::application::ports::http_transport::{AUTHORIZATION, HttpRequest, HttpTransport};
use crate::application::ports::offline_store::{Collection, OfflineStore};
use crate::domain::entities::offline::{
    DeadLetter, DeadLetterEntry, DrainReport, MAX_RETRIES_EXCEEDED, MutationProcessed,
    MutationRequest, QueuedMutation,
};
use crate::domain::value_objects::{MutationId, RetryPolicy, StoreCollection, WakeTag};
use crate::shared::error::AppError;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, warn};

const CONTENT_TYPE: &str = "Content-Type";
const JSON_CONTENT_TYPE: &str = "application/json";
const PROCESSED_CHANNEL_CAPACITY: usize = 64;

/// `process_mutation` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Succeeded,
    /// 失敗したがキューに残っている
    Retrying { reason: String, retry_count: u32 },
    DeadLettered { reason: String },
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Succeeded)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProcessOutcome::Succeeded => None,
            ProcessOutcome::Retrying { reason, .. } | ProcessOutcome::DeadLettered { reason } => {
                Some(reason)
            }
        }
    }
}

/// 書き込み要求の永続 FIFO キュー
pub struct MutationQueue {
    entries: Collection<QueuedMutation>,
    dead_letters: DeadLetterBox,
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    wake: Option<Arc<dyn DeferredWake>>,
    // 最後に払い出したタイムスタンプ。初回はキュー末尾から読む
    last_timestamp: Mutex<Option<i64>>,
    processed_tx: broadcast::Sender<MutationProcessed>,
    pending_tx: watch::Sender<u64>,
}

impl MutationQueue {
    pub fn new(
        store: Arc<dyn OfflineStore>,
        transport: Arc<dyn HttpTransport>,
        dead_letters: DeadLetterBox,
        policy: RetryPolicy,
    ) -> Self {
        let (processed_tx, _) = broadcast::channel(PROCESSED_CHANNEL_CAPACITY);
        let (pending_tx, _) = watch::channel(0);
        Self {
            entries: Collection::new(store, StoreCollection::PendingActions),
            dead_letters,
            transport,
            policy,
            wake: None,
            last_timestamp: Mutex::new(None),
            processed_tx,
            pending_tx,
        }
    }

    pub fn with_wake(mut self, wake: Arc<dyn DeferredWake>) -> Self {
        self.wake = Some(wake);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn queue_mutation(&self, request: MutationRequest) -> Result<MutationId, AppError> {
        if !request.method.is_mutation() {
            return Err(AppError::InvalidInput(format!(
                "{} is not a write method",
                request.method
            )));
        }

        let body = request
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let mut headers = request.headers;
        if body.is_some() && find_header(&headers, CONTENT_TYPE).is_none() {
            headers.insert(CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string());
        }

        let id = MutationId::generate();
        {
            let mut last = self.last_timestamp.lock().await;
            let timestamp = self.next_timestamp(&mut last).await?;
            let entry = QueuedMutation {
                id: id.clone(),
                url: request.url,
                method: request.method,
                headers,
                body,
                timestamp,
                retry_count: 0,
                action: request.action,
                entity_type: request.entity_type,
                entity_id: request.entity_id,
                last_error: None,
                next_attempt_at: None,
            };
            self.entries.save(&entry).await?;
            info!(
                target: "offline::mutations",
                id = %entry.id,
                method = entry.method.as_str(),
                entity_type = %entry.entity_type,
                entity_id = entry.entity_id.as_deref().unwrap_or(""),
                "mutation queued"
            );
        }

        self.refresh_pending().await?;
        self.request_wake();
        Ok(id)
    }

    /// 呼び出し元がロックを保持していること
    async fn next_timestamp(&self, last: &mut Option<i64>) -> Result<i64, AppError> {
        let floor = match *last {
            Some(value) => value,
            None => self
                .entries
                .all()
                .await?
                .iter()
                .map(|entry| entry.timestamp)
                .max()
                .unwrap_or(i64::MIN),
        };
        let timestamp = Utc::now().timestamp_millis().max(floor);
        *last = Some(timestamp);
        Ok(timestamp)
    }

    fn request_wake(&self) {
        if let Some(wake) = &self.wake
            && let Err(err) = wake.request_wake(WakeTag::Mutations)
        {
            warn!(
                target: "offline::mutations",
                error = %err,
                "failed to request deferred wake"
            );
        }
    }

    /// 挿入順（= タイムスタンプ順）
    pub async fn pending_mutations(&self) -> Result<Vec<QueuedMutation>, AppError> {
        self.entries.all().await
    }

    pub async fn pending_count(&self) -> Result<u64, AppError> {
        self.entries.count().await
    }

    pub async fn contains(&self, id: &MutationId) -> Result<bool, AppError> {
        Ok(self.entries.by_id(id.as_str()).await?.is_some())
    }

    pub async fn process_mutation(
        &self,
        entry: &QueuedMutation,
        auth_override: Option<&str>,
    ) -> Result<ProcessOutcome, AppError> {
        let request = build_request(entry, auth_override);
        let reason = match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                self.entries.remove(entry.id.as_str()).await?;
                self.refresh_pending().await?;
                debug!(
                    target: "offline::mutations",
                    id = %entry.id,
                    status = response.status,
                    "mutation replayed"
                );
                self.emit(MutationProcessed {
                    id: entry.id.clone(),
                    success: true,
                    error: None,
                });
                return Ok(ProcessOutcome::Succeeded);
            }
            Ok(response) => AppError::HttpStatus(response.status),
            // 端末側の保存失敗は再試行回数に数えず呼び出し元へ返す
            Err(err) if err.is_storage() => return Err(err),
            Err(err) => err,
        };

        warn!(
            target: "offline::mutations",
            id = %entry.id,
            retry_count = entry.retry_count,
            transient = reason.is_transient(),
            reason = %reason,
            "mutation replay failed"
        );
        let reason = reason.to_string();
        match self.retry_mutation(&entry.id, &reason).await? {
            Some(updated) => Ok(ProcessOutcome::Retrying {
                reason,
                retry_count: updated.retry_count,
            }),
            None => Ok(ProcessOutcome::DeadLettered { reason }),
        }
    }

    /// 再試行回数を進める。上限を超えたら dead letter に移して None を返す
    pub async fn retry_mutation(
        &self,
        id: &MutationId,
        reason: &str,
    ) -> Result<Option<QueuedMutation>, AppError> {
        let Some(mut entry) = self.entries.by_id(id.as_str()).await? else {
            return Ok(None);
        };

        entry.retry_count = entry.retry_count.saturating_add(1);
        entry.last_error = Some(reason.to_string());

        if self.policy.is_exhausted(entry.retry_count) {
            self.entries.remove(id.as_str()).await?;
            self.dead_letters
                .archive(
                    DeadLetterEntry::Mutation(entry),
                    MAX_RETRIES_EXCEEDED,
                    Some(reason.to_string()),
                )
                .await?;
            self.refresh_pending().await?;
            self.emit(MutationProcessed {
                id: id.clone(),
                success: false,
                error: Some(MAX_RETRIES_EXCEEDED.to_string()),
            });
            return Ok(None);
        }

        let delay = self.policy.backoff.delay_for(entry.retry_count);
        entry.next_attempt_at = (!delay.is_zero())
            .then(|| Utc::now().timestamp_millis() + delay.as_millis() as i64);
        self.entries.save(&entry).await?;
        Ok(Some(entry))
    }

    pub async fn remove_mutation(&self, id: &MutationId) -> Result<bool, AppError> {
        let removed = self.entries.remove(id.as_str()).await?;
        self.refresh_pending().await?;
        Ok(removed)
    }

    /// 開始時点のキューを FIFO で1件ずつ再送する。
    ///
    /// 失敗したエントリやバックオフ中のエントリと同じエンティティへの後続は
    /// このパスでは送らず deferred に数える。別エンティティの再送は続ける。
    pub async fn drain(&self, auth_override: Option<&str>) -> Result<DrainReport, AppError> {
        let snapshot = self.pending_mutations().await?;
        let now = Utc::now().timestamp_millis();
        let mut report = DrainReport::default();
        let mut blocked: HashSet<String> = HashSet::new();

        for entry in &snapshot {
            let key = entry.ordering_key();
            if blocked.contains(&key) || !entry.is_due(now) {
                report.deferred += 1;
                debug!(
                    target: "offline::mutations",
                    id = %entry.id,
                    key = %key,
                    "mutation deferred"
                );
                blocked.insert(key);
                continue;
            }
            // 同期中に削除されたエントリは飛ばす
            let Some(current) = self.entries.by_id(entry.id.as_str()).await? else {
                continue;
            };

            report.attempted += 1;
            match self.process_mutation(&current, auth_override).await? {
                ProcessOutcome::Succeeded => report.succeeded += 1,
                ProcessOutcome::Retrying { .. } => {
                    report.failed += 1;
                    blocked.insert(key);
                }
                ProcessOutcome::DeadLettered { .. } => {
                    report.failed += 1;
                    report.dead_lettered += 1;
                    blocked.insert(key);
                }
            }
        }

        if report.attempted > 0 {
            info!(
                target: "offline::mutations",
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                deferred = report.deferred,
                "mutation drain finished"
            );
        }
        Ok(report)
    }

    pub fn subscribe_processed(&self) -> broadcast::Receiver<MutationProcessed> {
        self.processed_tx.subscribe()
    }

    pub fn subscribe_pending(&self) -> watch::Receiver<u64> {
        self.pending_tx.subscribe()
    }

    pub async fn refresh_pending(&self) -> Result<u64, AppError> {
        let count = self.entries.count().await?;
        self.pending_tx.send_replace(count);
        Ok(count)
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, AppError> {
        Ok(self
            .dead_letters
            .list()
            .await?
            .into_iter()
            .filter(|letter| matches!(letter.entry, DeadLetterEntry::Mutation(_)))
            .collect())
    }

    pub async fn is_dead_lettered(&self, id: &MutationId) -> Result<bool, AppError> {
        Ok(matches!(
            self.dead_letters.get(id.as_str()).await?,
            Some(DeadLetter {
                entry: DeadLetterEntry::Mutation(_),
                ..
            })
        ))
    }

    /// dead letter を再試行回数 0 でキュー末尾に戻す
    pub async fn resubmit_dead_letter(&self, id: &str) -> Result<MutationId, AppError> {
        match self.dead_letters.get(id).await? {
            Some(DeadLetter {
                entry: DeadLetterEntry::Mutation(_),
                ..
            }) => {}
            Some(_) => {
                return Err(AppError::InvalidInput(format!(
                    "Dead letter {id} is not a mutation"
                )));
            }
            None => return Err(AppError::NotFound(format!("Dead letter {id}"))),
        }

        let Some(DeadLetter {
            entry: DeadLetterEntry::Mutation(mut entry),
            ..
        }) = self.dead_letters.take(id).await?
        else {
            return Err(AppError::NotFound(format!("Dead letter {id}")));
        };

        {
            let mut last = self.last_timestamp.lock().await;
            entry.timestamp = self.next_timestamp(&mut last).await?;
            entry.retry_count = 0;
            entry.last_error = None;
            entry.next_attempt_at = None;
            self.entries.save(&entry).await?;
        }
        info!(
            target: "offline::mutations",
            id = %entry.id,
            "dead letter resubmitted"
        );

        self.refresh_pending().await?;
        self.request_wake();
        Ok(entry.id)
    }

    pub async fn discard_dead_letter(&self, id: &str) -> Result<bool, AppError> {
        self.dead_letters.discard(id).await
    }

    fn emit(&self, event: MutationProcessed) {
        // 購読者がいなければ捨てる
        let _ = self.processed_tx.send(event);
    }
}

fn find_header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn build_request(entry: &QueuedMutation, auth_override: Option<&str>) -> HttpRequest {
    let mut headers = entry.headers.clone();
    if let Some(auth) = auth_override {
        headers.retain(|key, _| !key.eq_ignore_ascii_case(AUTHORIZATION));
        headers.insert(AUTHORIZATION.to_string(), auth.to_string());
    }
    HttpRequest {
        method: entry.method,
        url: entry.url.clone(),
        headers,
        body: entry.body.clone(),
    }
}
