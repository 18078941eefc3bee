use crate::application::ports::http_transport::HttpTransport;
use crate::application::ports::offline_store::OfflineStore;
use crate::application::ports::photo_compressor::{CompressionOptions, PhotoCompressor};
use crate::application::services::{
    AuthProvider, DeadLetterBox, MutationQueue, OfflineClient, PhotoQueue, SyncService,
    SyncStatusStore,
};
use crate::domain::value_objects::{Backoff, RetryPolicy};
use crate::infrastructure::background::ChannelWake;
use crate::infrastructure::connectivity::ConnectivityMonitor;
use crate::infrastructure::http::ReqwestTransport;
use crate::infrastructure::image::ImageCompressor;
use crate::infrastructure::offline::{ConnectionPool, SqliteOfflineStore};
use crate::shared::config::{AppConfig, SyncConfig};
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// エンジン一式の組み立て結果
pub struct EngineState {
    pub config: AppConfig,
    pub pool: Option<ConnectionPool>,
    pub store: Arc<dyn OfflineStore>,
    pub transport: Arc<dyn HttpTransport>,
    pub connectivity: ConnectivityMonitor,
    pub dead_letters: DeadLetterBox,
    pub mutations: Arc<MutationQueue>,
    pub photos: Arc<PhotoQueue>,
    pub client: Arc<OfflineClient>,
    pub status: Arc<SyncStatusStore>,
    pub sync: SyncService,
    probe: Option<JoinHandle<()>>,
}

impl EngineState {
    /// SQLite・reqwest・image の実装で組み立てる
    pub async fn initialize(config: AppConfig) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let pool = ConnectionPool::new(&config.database).await?;
        pool.migrate().await?;
        let store: Arc<dyn OfflineStore> = Arc::new(SqliteOfflineStore::new(pool.clone()));
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
            config.api.request_timeout_secs.map(Duration::from_secs),
        )?);

        let mut state = Self::assemble(config, store, transport, Arc::new(ImageCompressor::new()));
        state.pool = Some(pool);
        info!(target: "offline::sync", "offline engine initialized");
        Ok(state)
    }

    /// 差し替え済みのポートから組み立てる
    pub fn assemble(
        config: AppConfig,
        store: Arc<dyn OfflineStore>,
        transport: Arc<dyn HttpTransport>,
        compressor: Arc<dyn PhotoCompressor>,
    ) -> Self {
        let connectivity = ConnectivityMonitor::new(config.connectivity.assume_online);
        let (wake, wake_receiver) = ChannelWake::new();
        let wake = Arc::new(wake);
        let dead_letters = DeadLetterBox::new(store.clone());

        let mutations = Arc::new(
            MutationQueue::new(
                store.clone(),
                transport.clone(),
                dead_letters.clone(),
                mutation_policy(&config.sync),
            )
            .with_wake(wake.clone()),
        );
        let photos = Arc::new(
            PhotoQueue::new(
                store.clone(),
                transport.clone(),
                compressor,
                dead_letters.clone(),
                photo_policy(&config.sync),
            )
            .with_options(CompressionOptions::from(&config.photos))
            .with_retain_synced(config.photos.retain_synced)
            .with_wake(wake),
        );
        let client = Arc::new(
            OfflineClient::new(
                store.clone(),
                transport.clone(),
                mutations.clone(),
                config.sync.cache_version.clone(),
            )
            .with_connectivity(connectivity.subscribe()),
        );
        let status = Arc::new(SyncStatusStore::new(connectivity.is_online()));
        let sync = SyncService::new(
            mutations.clone(),
            photos.clone(),
            client.clone(),
            status.clone(),
            connectivity.subscribe(),
            config.endpoints.clone(),
        )
        .with_wake_receiver(wake_receiver);

        Self {
            config,
            pool: None,
            store,
            transport,
            connectivity,
            dead_letters,
            mutations,
            photos,
            client,
            status,
            sync,
            probe: None,
        }
    }

    /// 設定に従ってプローブとバックグラウンド同期を起動する
    pub async fn start(&mut self) {
        if let Some(url) = self.config.connectivity.probe_url.clone()
            && self.probe.is_none()
        {
            self.probe = Some(self.connectivity.spawn_probe(
                self.transport.clone(),
                url,
                Duration::from_secs(self.config.connectivity.probe_interval),
            ));
        }

        if self.config.sync.auto_sync {
            let auth_header = self.config.api.auth_header.clone();
            let auth: AuthProvider = Arc::new(move || auth_header.clone());
            self.sync
                .start_background_sync(
                    self.config.api.base_url.clone(),
                    auth,
                    Duration::from_secs(self.config.sync.sync_interval),
                )
                .await;
        }
    }

    pub async fn shutdown(&mut self) {
        self.sync.stop_background_sync().await;
        if let Some(probe) = self.probe.take() {
            probe.abort();
        }
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        info!(target: "offline::sync", "offline engine stopped");
    }
}

pub fn mutation_policy(config: &SyncConfig) -> RetryPolicy {
    let backoff = if config.backoff_base_ms > 0 {
        Backoff::Exponential {
            base_ms: config.backoff_base_ms,
            max_ms: config.backoff_max_ms,
        }
    } else {
        Backoff::None
    };
    RetryPolicy::bounded(config.mutation_max_retries).with_backoff(backoff)
}

pub fn photo_policy(config: &SyncConfig) -> RetryPolicy {
    match config.photo_max_retries {
        Some(max_retries) => RetryPolicy::bounded(max_retries),
        None => RetryPolicy::photo_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_follow_sync_config() {
        let mut config = AppConfig::default().sync;
        assert_eq!(mutation_policy(&config), RetryPolicy::mutation_default());
        assert_eq!(photo_policy(&config), RetryPolicy::unbounded());

        config.backoff_base_ms = 500;
        config.backoff_max_ms = 8_000;
        config.photo_max_retries = Some(3);
        assert_eq!(
            mutation_policy(&config).backoff,
            Backoff::Exponential {
                base_ms: 500,
                max_ms: 8_000
            }
        );
        assert_eq!(photo_policy(&config).max_retries, Some(3));
    }
}
