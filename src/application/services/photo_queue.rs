use super::dead_letters::DeadLetterBox;
use crate::application::ports::deferred_wake::DeferredWake;
use crate::application::ports::http_transport::{AUTHORIZATION, HttpTransport, MultipartUpload};
use crate::application::ports::offline_store::{Collection, OfflineStore};
use crate::application::ports::photo_compressor::{CompressionOptions, PhotoCompressor};
use crate::domain::entities::offline::{
    DeadLetter, DeadLetterEntry, MAX_RETRIES_EXCEEDED, PendingPhoto, PhotoSyncReport,
    PhotoUploadRequest, QueuedMutation,
};
use crate::domain::value_objects::{MutationId, PhotoId, RetryPolicy, StoreCollection, WakeTag};
use crate::shared::error::AppError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const UPLOAD_FIELD: &str = "file";

/// 圧縮済み写真のアップロード待ちキュー
pub struct PhotoQueue {
    photos: Collection<PendingPhoto>,
    mutations: Collection<QueuedMutation>,
    dead_letters: DeadLetterBox,
    transport: Arc<dyn HttpTransport>,
    compressor: Arc<dyn PhotoCompressor>,
    options: CompressionOptions,
    policy: RetryPolicy,
    retain_synced: bool,
    wake: Option<Arc<dyn DeferredWake>>,
    pending_tx: watch::Sender<u64>,
}

impl PhotoQueue {
    pub fn new(
        store: Arc<dyn OfflineStore>,
        transport: Arc<dyn HttpTransport>,
        compressor: Arc<dyn PhotoCompressor>,
        dead_letters: DeadLetterBox,
        policy: RetryPolicy,
    ) -> Self {
        let (pending_tx, _) = watch::channel(0);
        Self {
            photos: Collection::new(store.clone(), StoreCollection::Photos),
            mutations: Collection::new(store, StoreCollection::PendingActions),
            dead_letters,
            transport,
            compressor,
            options: CompressionOptions::default(),
            policy,
            retain_synced: true,
            wake: None,
            pending_tx,
        }
    }

    pub fn with_options(mut self, options: CompressionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retain_synced(mut self, retain_synced: bool) -> Self {
        self.retain_synced = retain_synced;
        self
    }

    pub fn with_wake(mut self, wake: Arc<dyn DeferredWake>) -> Self {
        self.wake = Some(wake);
        self
    }

    pub async fn compress_photo(
        &self,
        input: Vec<u8>,
        options: Option<CompressionOptions>,
    ) -> Result<Vec<u8>, AppError> {
        let compressed = self
            .compressor
            .compress(input, options.unwrap_or(self.options))
            .await?;
        Ok(compressed.bytes)
    }

    pub async fn queue_photo_upload(
        &self,
        request: PhotoUploadRequest,
    ) -> Result<PendingPhoto, AppError> {
        let compressed = self.compressor.compress(request.file, self.options).await?;
        let photo = PendingPhoto {
            id: PhotoId::generate(),
            entity_type: request.entity_type,
            entity_id: request.entity_id,
            filename: filename_for(&request.filename, &compressed.content_type),
            blob: compressed.bytes,
            content_type: compressed.content_type,
            upload_url: request.upload_url,
            auth_header: request.auth_header,
            synced: false,
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
            depends_on: request.depends_on,
            synced_at: None,
        };
        self.photos.save(&photo).await?;
        info!(
            target: "offline::photos",
            id = %photo.id,
            entity_type = %photo.entity_type,
            entity_id = %photo.entity_id,
            bytes = photo.blob.len(),
            "photo queued"
        );

        self.refresh_pending().await?;
        self.request_wake();
        Ok(photo)
    }

    fn request_wake(&self) {
        if let Some(wake) = &self.wake
            && let Err(err) = wake.request_wake(WakeTag::Photos)
        {
            warn!(
                target: "offline::photos",
                error = %err,
                "failed to request deferred wake"
            );
        }
    }

    /// 未送信の写真（撮影順）
    pub async fn pending_photos(&self) -> Result<Vec<PendingPhoto>, AppError> {
        Ok(self
            .photos
            .all()
            .await?
            .into_iter()
            .filter(|photo| !photo.synced)
            .collect())
    }

    pub async fn all_photos(&self) -> Result<Vec<PendingPhoto>, AppError> {
        self.photos.all().await
    }

    /// 同期済みで残している写真の blob は読まない
    pub async fn pending_count(&self) -> Result<u64, AppError> {
        self.photos.count_where("synced", false).await
    }

    async fn blocked_by(&self, dependency: &MutationId) -> Result<bool, AppError> {
        if self.mutations.by_id(dependency.as_str()).await?.is_some() {
            return Ok(true);
        }
        Ok(matches!(
            self.dead_letters.get(dependency.as_str()).await?,
            Some(DeadLetter {
                entry: DeadLetterEntry::Mutation(_),
                ..
            })
        ))
    }

    pub async fn sync_pending_photos(
        &self,
        auth_header: Option<&str>,
    ) -> Result<PhotoSyncReport, AppError> {
        let mut report = PhotoSyncReport::default();

        for mut photo in self.pending_photos().await? {
            if let Some(dependency) = &photo.depends_on
                && self.blocked_by(dependency).await?
            {
                debug!(
                    target: "offline::photos",
                    id = %photo.id,
                    depends_on = %dependency,
                    "photo waiting for mutation"
                );
                report.deferred += 1;
                continue;
            }

            let upload = build_upload(&photo, auth_header);
            let reason = match self.transport.upload(upload).await {
                Ok(response) if response.is_success() => None,
                Ok(response) => Some(AppError::HttpStatus(response.status).to_string()),
                Err(err) if err.is_storage() => return Err(err),
                Err(err) => Some(err.to_string()),
            };

            match reason {
                None => {
                    if self.retain_synced {
                        photo.synced = true;
                        photo.synced_at = Some(Utc::now());
                        photo.last_error = None;
                        self.photos.save(&photo).await?;
                    } else {
                        self.photos.remove(photo.id.as_str()).await?;
                    }
                    debug!(target: "offline::photos", id = %photo.id, "photo uploaded");
                    report.synced += 1;
                }
                Some(reason) => {
                    photo.attempts = photo.attempts.saturating_add(1);
                    photo.last_error = Some(reason.clone());
                    warn!(
                        target: "offline::photos",
                        id = %photo.id,
                        attempts = photo.attempts,
                        reason = %reason,
                        "photo upload failed"
                    );
                    report.failed += 1;

                    if self.policy.is_exhausted(photo.attempts) {
                        self.photos.remove(photo.id.as_str()).await?;
                        self.dead_letters
                            .archive(
                                DeadLetterEntry::Photo(photo),
                                MAX_RETRIES_EXCEEDED,
                                Some(reason),
                            )
                            .await?;
                        report.dead_lettered += 1;
                    } else {
                        self.photos.save(&photo).await?;
                    }
                }
            }
        }

        self.refresh_pending().await?;
        if report.synced + report.failed > 0 {
            info!(
                target: "offline::photos",
                synced = report.synced,
                failed = report.failed,
                deferred = report.deferred,
                "photo sync finished"
            );
        }
        Ok(report)
    }

    /// 送信済みの写真を削除する
    pub async fn purge_synced(&self) -> Result<usize, AppError> {
        let mut purged = 0;
        for photo in self.photos.all().await? {
            if photo.synced && self.photos.remove(photo.id.as_str()).await? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    pub fn subscribe_pending(&self) -> watch::Receiver<u64> {
        self.pending_tx.subscribe()
    }

    pub async fn refresh_pending(&self) -> Result<u64, AppError> {
        let count = self.pending_count().await?;
        self.pending_tx.send_replace(count);
        Ok(count)
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, AppError> {
        Ok(self
            .dead_letters
            .list()
            .await?
            .into_iter()
            .filter(|letter| matches!(letter.entry, DeadLetterEntry::Photo(_)))
            .collect())
    }

    pub async fn resubmit_dead_letter(&self, id: &str) -> Result<PhotoId, AppError> {
        match self.dead_letters.get(id).await? {
            Some(DeadLetter {
                entry: DeadLetterEntry::Photo(_),
                ..
            }) => {}
            Some(_) => {
                return Err(AppError::InvalidInput(format!(
                    "Dead letter {id} is not a photo"
                )));
            }
            None => return Err(AppError::NotFound(format!("Dead letter {id}"))),
        }

        let Some(DeadLetter {
            entry: DeadLetterEntry::Photo(mut photo),
            ..
        }) = self.dead_letters.take(id).await?
        else {
            return Err(AppError::NotFound(format!("Dead letter {id}")));
        };

        photo.attempts = 0;
        photo.last_error = None;
        photo.synced = false;
        photo.synced_at = None;
        self.photos.save(&photo).await?;
        info!(target: "offline::photos", id = %photo.id, "dead letter resubmitted");

        self.refresh_pending().await?;
        self.request_wake();
        Ok(photo.id)
    }

    pub async fn discard_dead_letter(&self, id: &str) -> Result<bool, AppError> {
        self.dead_letters.discard(id).await
    }
}

fn build_upload(photo: &PendingPhoto, auth_override: Option<&str>) -> MultipartUpload {
    let mut headers = BTreeMap::new();
    if let Some(auth) = auth_override.or(photo.auth_header.as_deref()) {
        headers.insert(AUTHORIZATION.to_string(), auth.to_string());
    }
    MultipartUpload {
        url: photo.upload_url.clone(),
        headers,
        field_name: UPLOAD_FIELD.to_string(),
        filename: photo.filename.clone(),
        content_type: photo.content_type.clone(),
        bytes: photo.blob.clone(),
        fields: vec![
            ("entityType".to_string(), photo.entity_type.clone()),
            ("entityId".to_string(), photo.entity_id.clone()),
        ],
    }
}

/// 再エンコード後の形式に合わせて拡張子を付け直す
fn filename_for(original: &str, content_type: &str) -> String {
    let extension = match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        _ => return original.to_string(),
    };
    let stem = match original.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => original,
    };
    let stem = if stem.trim().is_empty() { "photo" } else { stem };
    format!("{stem}.{extension}")
}
