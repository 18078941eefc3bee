use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub photos: PhotoConfig,
    pub endpoints: EndpointConfig,
    pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// `Authorization` ヘッダーにそのまま載せる値（例: `Bearer xxx`）
    #[serde(default)]
    pub auth_header: Option<String>,
    /// 未設定ならHTTPクライアント既定のタイムアウトに任せる
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_interval: u64,
    pub mutation_max_retries: u32,
    /// None の場合は写真アップロードを無制限に再試行する
    #[serde(default)]
    pub photo_max_retries: Option<u32>,
    #[serde(default)]
    pub backoff_base_ms: u64,
    #[serde(default)]
    pub backoff_max_ms: u64,
    pub cache_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    pub max_bytes: usize,
    pub max_dimension: u32,
    pub initial_quality: u8,
    pub min_quality: u8,
    pub retain_synced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub stock_items: String,
    pub job_cards: String,
    pub delivery_notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default)]
    pub probe_url: Option<String>,
    pub probe_interval: u64,
    pub assume_online: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: 5,
            },
            api: ApiConfig {
                base_url: "http://localhost:4001/api".to_string(),
                auth_header: None,
                request_timeout_secs: None,
            },
            sync: SyncConfig {
                auto_sync: true,
                sync_interval: 300, // 5 minutes
                mutation_max_retries: 5,
                photo_max_retries: None,
                backoff_base_ms: 0,
                backoff_max_ms: 0,
                cache_version: "1".to_string(),
            },
            photos: PhotoConfig {
                max_bytes: 1024 * 1024, // 1MB
                max_dimension: 1920,
                initial_quality: 85,
                min_quality: 40,
                retain_synced: true,
            },
            endpoints: EndpointConfig {
                stock_items: "stock-control/inventory".to_string(),
                job_cards: "stock-control/job-cards".to_string(),
                delivery_notes: "stock-control/deliveries".to_string(),
            },
            connectivity: ConnectivityConfig {
                probe_url: None,
                probe_interval: 30,
                assume_online: true,
            },
        }
    }
}

fn default_database_url() -> String {
    let dir = dirs::data_local_dir()
        .map(|dir| dir.join("fieldsync"))
        .unwrap_or_else(|| PathBuf::from("./data"));
    format!("sqlite://{}?mode=rwc", dir.join("offline.db").display())
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー解決関数から設定を組み立てる（`from_env` の実体）
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("FIELDSYNC_DATABASE_URL") {
            cfg.database.url = v;
        }
        if let Some(v) = lookup("FIELDSYNC_DATABASE_MAX_CONNECTIONS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.database.max_connections = value as u32;
        }

        // API
        if let Some(v) = lookup("FIELDSYNC_API_BASE_URL") {
            cfg.api.base_url = v.trim().to_string();
        }
        if let Some(v) = lookup("FIELDSYNC_API_TOKEN") {
            let token = v.trim();
            if !token.is_empty() {
                cfg.api.auth_header = Some(format!("Bearer {token}"));
            }
        }
        if let Some(v) = lookup("FIELDSYNC_API_TIMEOUT_SECS") {
            cfg.api.request_timeout_secs = parse_u64(&v).filter(|secs| *secs > 0);
        }

        // 同期
        if let Some(v) = lookup("FIELDSYNC_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(v) = lookup("FIELDSYNC_SYNC_INTERVAL_SECS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.sync.sync_interval = value.max(1);
        }
        if let Some(v) = lookup("FIELDSYNC_MUTATION_MAX_RETRIES")
            && let Some(value) = parse_u64(&v)
        {
            cfg.sync.mutation_max_retries = value as u32;
        }
        if let Some(v) = lookup("FIELDSYNC_PHOTO_MAX_RETRIES") {
            cfg.sync.photo_max_retries = parse_u64(&v).map(|value| value as u32);
        }
        if let Some(v) = lookup("FIELDSYNC_BACKOFF_BASE_MS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.sync.backoff_base_ms = value;
        }
        if let Some(v) = lookup("FIELDSYNC_BACKOFF_MAX_MS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.sync.backoff_max_ms = value;
        }

        // 写真
        if let Some(v) = lookup("FIELDSYNC_PHOTO_MAX_BYTES")
            && let Some(value) = parse_u64(&v)
        {
            cfg.photos.max_bytes = value as usize;
        }
        if let Some(v) = lookup("FIELDSYNC_PHOTO_MAX_DIMENSION")
            && let Some(value) = parse_u64(&v)
        {
            cfg.photos.max_dimension = value as u32;
        }
        if let Some(v) = lookup("FIELDSYNC_PHOTO_RETAIN_SYNCED") {
            cfg.photos.retain_synced = parse_bool(&v, cfg.photos.retain_synced);
        }

        // 接続性
        if let Some(v) = lookup("FIELDSYNC_PROBE_URL") {
            let url = v.trim();
            cfg.connectivity.probe_url = (!url.is_empty()).then(|| url.to_string());
        }
        if let Some(v) = lookup("FIELDSYNC_PROBE_INTERVAL_SECS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.connectivity.probe_interval = value.max(1);
        }
        if let Some(v) = lookup("FIELDSYNC_ASSUME_ONLINE") {
            cfg.connectivity.assume_online = parse_bool(&v, cfg.connectivity.assume_online);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.api.base_url.trim().is_empty() {
            return Err("API base_url must not be empty".to_string());
        }
        if self.sync.sync_interval == 0 {
            return Err("Sync interval must be greater than 0".to_string());
        }
        if self.sync.backoff_max_ms > 0 && self.sync.backoff_max_ms < self.sync.backoff_base_ms {
            return Err("Sync backoff_max_ms must not be below backoff_base_ms".to_string());
        }
        if self.photos.max_bytes == 0 || self.photos.max_dimension == 0 {
            return Err("Photo limits must be greater than 0".to_string());
        }
        if self.photos.min_quality == 0
            || self.photos.initial_quality > 100
            || self.photos.min_quality > self.photos.initial_quality
        {
            return Err("Photo quality must satisfy 0 < min_quality <= initial_quality <= 100".to_string());
        }
        if self.connectivity.probe_url.is_some() && self.connectivity.probe_interval == 0 {
            return Err("Connectivity probe_interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
