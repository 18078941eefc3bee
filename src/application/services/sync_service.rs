use super::mutation_queue::MutationQueue;
use super::offline_client::OfflineClient;
use super::photo_queue::PhotoQueue;
use super::sync_status::{StatusSubscription, SyncStatusStore};
use crate::application::ports::deferred_wake::WakeReceiver;
use crate::application::ports::http_transport::join_url;
use crate::domain::entities::offline::{SyncOutcome, SyncReport, SyncStatus};
use crate::domain::value_objects::{CacheCollection, WakeTag};
use crate::infrastructure::offline::metrics::{PassTrigger, SyncMetrics, SyncMetricsSnapshot};
use crate::shared::config::EndpointConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// バックグラウンド同期のたびに呼ばれ、その時点の `Authorization` 値を返す
pub type AuthProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

struct BackgroundTask {
    shutdown: oneshot::Sender<()>,
    // 停止時に遅延実行の受信側を返す
    handle: JoinHandle<Option<WakeReceiver>>,
}

// 同期中フラグを drop で下ろす
struct PassGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SyncService {
    mutations: Arc<MutationQueue>,
    photos: Arc<PhotoQueue>,
    client: Arc<OfflineClient>,
    status: Arc<SyncStatusStore>,
    metrics: Arc<SyncMetrics>,
    endpoints: Arc<EndpointConfig>,
    connectivity: watch::Receiver<bool>,
    syncing: Arc<AtomicBool>,
    wake_receiver: Arc<Mutex<Option<WakeReceiver>>>,
    background: Arc<Mutex<Option<BackgroundTask>>>,
}

impl SyncService {
    pub fn new(
        mutations: Arc<MutationQueue>,
        photos: Arc<PhotoQueue>,
        client: Arc<OfflineClient>,
        status: Arc<SyncStatusStore>,
        connectivity: watch::Receiver<bool>,
        endpoints: EndpointConfig,
    ) -> Self {
        let online = *connectivity.borrow();
        status.update(|current| current.is_online = online);
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::spawn(forward_status(
                status.clone(),
                connectivity.clone(),
                mutations.subscribe_pending(),
                photos.subscribe_pending(),
            ));
        } else {
            debug!(target: "offline::sync", "no runtime; status follows sync passes only");
        }
        Self {
            mutations,
            photos,
            client,
            status,
            metrics: Arc::new(SyncMetrics::new()),
            endpoints: Arc::new(endpoints),
            connectivity,
            syncing: Arc::new(AtomicBool::new(false)),
            wake_receiver: Arc::new(Mutex::new(None)),
            background: Arc::new(Mutex::new(None)),
        }
    }

    /// 遅延実行の受信側。バックグラウンド同期の開始時に取り込まれる
    pub fn with_wake_receiver(self, receiver: WakeReceiver) -> Self {
        Self {
            wake_receiver: Arc::new(Mutex::new(Some(receiver))),
            ..self
        }
    }

    fn endpoint(&self, collection: CacheCollection) -> &str {
        match collection {
            CacheCollection::StockItems => &self.endpoints.stock_items,
            CacheCollection::JobCards => &self.endpoints.job_cards,
            CacheCollection::DeliveryNotes => &self.endpoints.delivery_notes,
        }
    }

    fn try_begin(&self) -> Option<PassGuard> {
        self.syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard {
                flag: self.syncing.clone(),
            })
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub async fn sync_data(&self, api_base_url: &str, auth_header: Option<&str>) -> SyncOutcome {
        self.run_pass(PassTrigger::Manual, api_base_url, auth_header)
            .await
    }

    pub async fn force_sync(&self, api_base_url: &str, auth_header: Option<&str>) -> SyncOutcome {
        self.sync_data(api_base_url, auth_header).await
    }

    async fn run_pass(
        &self,
        trigger: PassTrigger,
        api_base_url: &str,
        auth_header: Option<&str>,
    ) -> SyncOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!(target: "offline::sync", ?trigger, "sync already in progress");
            self.metrics.record_skipped(trigger);
            return SyncOutcome::already_in_progress();
        };

        let started = Instant::now();
        self.status.update(|status| {
            status.is_syncing = true;
            status.error = None;
        });
        info!(target: "offline::sync", ?trigger, "sync started");

        let result = self.execute(api_base_url, auth_header).await;
        self.finish(trigger, started, result).await
    }

    async fn execute(
        &self,
        api_base_url: &str,
        auth_header: Option<&str>,
    ) -> Result<SyncReport, AppError> {
        let mutations = self.mutations.drain(auth_header).await?;
        let photos = self.photos.sync_pending_photos(auth_header).await?;

        // コレクション同士は独立しているので並行に取得する
        let refreshes = CacheCollection::ALL.map(|collection| {
            let url = join_url(api_base_url, self.endpoint(collection));
            async move {
                self.client
                    .refresh_collection(collection, &url, auth_header)
                    .await
            }
        });
        let refreshed = join_all(refreshes)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(SyncReport {
            mutations,
            photos,
            refreshed,
        })
    }

    async fn finish(
        &self,
        trigger: PassTrigger,
        started: Instant,
        result: Result<SyncReport, AppError>,
    ) -> SyncOutcome {
        let counts = self.pending_counts().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(report) => {
                self.status.update(|status| {
                    status.is_syncing = false;
                    status.last_sync_at = Some(Utc::now());
                    if let Ok((mutations, photos)) = counts {
                        status.pending_mutations = mutations;
                        status.pending_photos = photos;
                    }
                });
                if report.refresh_failures() > 0 {
                    warn!(
                        target: "offline::sync",
                        failures = report.refresh_failures(),
                        "some collections were not refreshed"
                    );
                }
                info!(
                    target: "offline::sync",
                    ?trigger,
                    duration_ms,
                    replayed = report.mutations.succeeded,
                    photos = report.photos.synced,
                    "sync finished"
                );
                self.metrics
                    .record_pass(trigger, duration_ms, Some(&report), None);
                SyncOutcome::completed(report)
            }
            Err(err) => {
                let storage = err.is_storage();
                let message = err.to_string();
                self.status.update(|status| {
                    status.is_syncing = false;
                    status.error = Some(message.clone());
                    if let Ok((mutations, photos)) = counts {
                        status.pending_mutations = mutations;
                        status.pending_photos = photos;
                    }
                });
                error!(
                    target: "offline::sync",
                    ?trigger,
                    storage,
                    error = %message,
                    "sync failed"
                );
                self.metrics
                    .record_pass(trigger, duration_ms, None, Some(&message));
                SyncOutcome::failed(message)
            }
        }
    }

    /// 片方のキューだけを消化する（遅延実行タグ用）
    async fn run_scoped(&self, tag: WakeTag, auth_header: Option<&str>) -> SyncOutcome {
        let Some(_guard) = self.try_begin() else {
            self.metrics.record_skipped(PassTrigger::Wake);
            return SyncOutcome::already_in_progress();
        };

        let started = Instant::now();
        self.status.update(|status| {
            status.is_syncing = true;
            status.error = None;
        });
        debug!(target: "offline::sync", tag = %tag, "scoped sync started");

        let result = match tag {
            WakeTag::Mutations => self
                .mutations
                .drain(auth_header)
                .await
                .map(|mutations| SyncReport {
                    mutations,
                    ..SyncReport::default()
                }),
            WakeTag::Photos => self
                .photos
                .sync_pending_photos(auth_header)
                .await
                .map(|photos| SyncReport {
                    photos,
                    ..SyncReport::default()
                }),
        };
        self.finish(PassTrigger::Wake, started, result).await
    }

    async fn pending_counts(&self) -> Result<(u64, u64), AppError> {
        let mutations = self.mutations.refresh_pending().await?;
        let photos = self.photos.refresh_pending().await?;
        Ok((mutations, photos))
    }

    pub async fn refresh_pending_counts(&self) -> Result<SyncStatus, AppError> {
        let (mutations, photos) = self.pending_counts().await?;
        Ok(self.status.update(|status| {
            status.pending_mutations = mutations;
            status.pending_photos = photos;
        }))
    }

    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    pub fn on_sync_status_change<F>(&self, listener: F) -> StatusSubscription
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        self.status.on_change(listener)
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn is_background_running(&self) -> bool {
        self.background.lock().await.is_some()
    }

    /// 接続監視・定期実行・遅延実行要求を1つのタスクで捌く。二重起動は無視する
    pub async fn start_background_sync(
        &self,
        api_base_url: impl Into<String>,
        auth: AuthProvider,
        interval: Duration,
    ) {
        let mut background = self.background.lock().await;
        if background.is_some() {
            warn!(target: "offline::sync", "background sync already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let wake = self.wake_receiver.lock().await.take();
        let service = self.clone();
        let api_base_url = api_base_url.into();
        let interval = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            service
                .background_loop(api_base_url, auth, interval, shutdown_rx, wake)
                .await
        });

        info!(
            target: "offline::sync",
            interval_secs = interval.as_secs(),
            "background sync started"
        );
        *background = Some(BackgroundTask {
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// 以後のパスを止め、実行中のパスは終わるまで待つ
    pub async fn stop_background_sync(&self) {
        let Some(task) = self.background.lock().await.take() else {
            return;
        };
        let _ = task.shutdown.send(());
        match task.handle.await {
            // 次回の start で再び取り込めるよう戻しておく
            Ok(Some(receiver)) => *self.wake_receiver.lock().await = Some(receiver),
            Ok(None) => {}
            Err(err) => {
                warn!(target: "offline::sync", error = %err, "background sync task aborted");
            }
        }
        info!(target: "offline::sync", "background sync stopped");
    }

    async fn background_loop(
        &self,
        api_base_url: String,
        auth: AuthProvider,
        interval: Duration,
        mut shutdown: oneshot::Receiver<()>,
        mut wake: Option<WakeReceiver>,
    ) -> Option<WakeReceiver> {
        let mut connectivity = self.connectivity.clone();
        let mut connectivity_open = true;
        let mut online = *connectivity.borrow_and_update();
        self.status.update(|status| status.is_online = online);

        // 初回 tick は即時に発火する
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => return wake,
                _ = ticker.tick() => {
                    if online {
                        let auth_header = auth();
                        self.run_pass(PassTrigger::Timer, &api_base_url, auth_header.as_deref())
                            .await;
                    }
                }
                changed = connectivity.changed(), if connectivity_open => {
                    if changed.is_err() {
                        connectivity_open = false;
                        continue;
                    }
                    let now_online = *connectivity.borrow_and_update();
                    if now_online == online {
                        continue;
                    }
                    online = now_online;
                    self.status.update(|status| status.is_online = now_online);
                    info!(target: "offline::sync", online, "connectivity changed");
                    if online {
                        let auth_header = auth();
                        self.run_pass(PassTrigger::Reconnect, &api_base_url, auth_header.as_deref())
                            .await;
                    }
                }
                tag = next_wake(&mut wake), if wake.is_some() => {
                    let Some(tag) = tag else {
                        wake = None;
                        continue;
                    };
                    if online {
                        let auth_header = auth();
                        self.run_scoped(tag, auth_header.as_deref()).await;
                    } else {
                        debug!(target: "offline::sync", tag = %tag, "wake ignored while offline");
                    }
                }
            }
        }
    }
}

/// 接続状態と未送信件数を同期ループの有無に関わらず状態へ反映する。
/// 送信側がすべて閉じたら終わる。
async fn forward_status(
    status: Arc<SyncStatusStore>,
    mut connectivity: watch::Receiver<bool>,
    mut mutation_pending: watch::Receiver<u64>,
    mut photo_pending: watch::Receiver<u64>,
) {
    let (mut connectivity_open, mut mutations_open, mut photos_open) = (true, true, true);
    while connectivity_open || mutations_open || photos_open {
        tokio::select! {
            changed = connectivity.changed(), if connectivity_open => match changed {
                Ok(()) => {
                    let online = *connectivity.borrow_and_update();
                    status.update(|current| current.is_online = online);
                }
                Err(_) => connectivity_open = false,
            },
            changed = mutation_pending.changed(), if mutations_open => match changed {
                Ok(()) => {
                    let count = *mutation_pending.borrow_and_update();
                    status.update(|current| current.pending_mutations = count);
                }
                Err(_) => mutations_open = false,
            },
            changed = photo_pending.changed(), if photos_open => match changed {
                Ok(()) => {
                    let count = *photo_pending.borrow_and_update();
                    status.update(|current| current.pending_photos = count);
                }
                Err(_) => photos_open = false,
            },
        }
    }
}

async fn next_wake(receiver: &mut Option<WakeReceiver>) -> Option<WakeTag> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

impl Clone for SyncService {
    fn clone(&self) -> Self {
        Self {
            mutations: self.mutations.clone(),
            photos: self.photos.clone(),
            client: self.client.clone(),
            status: self.status.clone(),
            metrics: self.metrics.clone(),
            endpoints: self.endpoints.clone(),
            connectivity: self.connectivity.clone(),
            syncing: self.syncing.clone(),
            wake_receiver: self.wake_receiver.clone(),
            background: self.background.clone(),
        }
    }
}
