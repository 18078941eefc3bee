//! テスト用の差し替え部品。単体テストと `tests/` の両方から使う。

use crate::application::ports::http_transport::{
    HttpRequest, HttpResponse, HttpTransport, MultipartUpload,
};
use crate::application::ports::offline_store::OfflineStore;
use crate::application::ports::photo_compressor::{
    CompressedPhoto, CompressionOptions, PhotoCompressor,
};
use crate::domain::value_objects::HttpMethod;
use crate::infrastructure::offline::{ConnectionPool, SqliteOfflineStore};
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, watch};

/// マイグレーション済みのインメモリストア
pub async fn memory_store() -> Result<Arc<dyn OfflineStore>, AppError> {
    let pool = ConnectionPool::from_memory().await?;
    pool.migrate().await?;
    Ok(Arc::new(SqliteOfflineStore::new(pool)))
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    Reply { status: u16, body: String },
    NetworkError(String),
    /// 送信口の裏で端末側の保存が失敗した場合
    StorageError(String),
}

impl MockResponse {
    pub fn status(status: u16, body: &str) -> Self {
        MockResponse::Reply {
            status,
            body: body.to_string(),
        }
    }

    pub fn ok() -> Self {
        Self::status(200, "")
    }

    pub fn json(body: Value) -> Self {
        MockResponse::Reply {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn network_error() -> Self {
        MockResponse::NetworkError("connection refused".to_string())
    }

    pub fn storage_error() -> Self {
        MockResponse::StorageError("disk full".to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpload {
    pub field_name: String,
    pub filename: String,
    pub content_type: String,
    pub fields: Vec<(String, String)>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub upload: Option<RecordedUpload>,
}

struct Route {
    method: Option<HttpMethod>,
    pattern: String,
    responses: VecDeque<MockResponse>,
}

impl Route {
    fn matches(&self, method: HttpMethod, url: &str) -> bool {
        self.method.is_none_or(|expected| expected == method) && url.contains(&self.pattern)
    }

    // 最後の1件は使い回す
    fn next(&mut self) -> MockResponse {
        if self.responses.len() > 1 {
            self.responses.pop_front().unwrap_or_else(MockResponse::ok)
        } else {
            self.responses.front().cloned().unwrap_or_else(MockResponse::ok)
        }
    }
}

/// 呼び出しを記録し、URL の部分一致で応答を返す送信口
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
    offline: AtomicBool,
    paused: watch::Sender<bool>,
    recorded: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            paused,
            recorded: Notify::new(),
        }
    }

    /// 後から登録したルートが優先される
    pub fn respond(&self, method: Option<HttpMethod>, pattern: &str, response: MockResponse) {
        self.respond_sequence(method, pattern, vec![response]);
    }

    pub fn respond_sequence(
        &self,
        method: Option<HttpMethod>,
        pattern: &str,
        responses: Vec<MockResponse>,
    ) {
        lock(&self.routes).push(Route {
            method,
            pattern: pattern.to_string(),
            responses: responses.into(),
        });
    }

    pub fn clear_routes(&self) {
        lock(&self.routes).clear();
    }

    /// true の間は全リクエストが到達失敗になる
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// 記録後、`resume` まで応答を保留する
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_matching(&self, method: HttpMethod, pattern: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method && call.url.contains(pattern))
            .collect()
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.recorded.notified();
            if lock(&self.calls).len() >= count {
                return;
            }
            notified.await;
        }
    }

    async fn handle(&self, call: RecordedCall) -> Result<HttpResponse, AppError> {
        let method = call.method;
        let url = call.url.clone();
        lock(&self.calls).push(call);
        self.recorded.notify_waiters();

        let mut paused = self.paused.subscribe();
        while *paused.borrow_and_update() {
            if paused.changed().await.is_err() {
                break;
            }
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Network("connection refused".to_string()));
        }

        let response = lock(&self.routes)
            .iter_mut()
            .rev()
            .find(|route| route.matches(method, &url))
            .map(Route::next)
            .unwrap_or_else(MockResponse::ok);

        match response {
            MockResponse::Reply { status, body } => Ok(HttpResponse::new(status, body)),
            MockResponse::NetworkError(message) => Err(AppError::Network(message)),
            MockResponse::StorageError(message) => Err(AppError::Storage(message)),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        self.handle(RecordedCall {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body,
            upload: None,
        })
        .await
    }

    async fn upload(&self, upload: MultipartUpload) -> Result<HttpResponse, AppError> {
        self.handle(RecordedCall {
            method: HttpMethod::Post,
            url: upload.url,
            headers: upload.headers,
            body: None,
            upload: Some(RecordedUpload {
                field_name: upload.field_name,
                filename: upload.filename,
                content_type: upload.content_type,
                fields: upload.fields,
                size: upload.bytes.len(),
            }),
        })
        .await
    }
}

/// 入力をそのまま JPEG 扱いで返す
pub struct PassthroughCompressor;

#[async_trait]
impl PhotoCompressor for PassthroughCompressor {
    async fn compress(
        &self,
        input: Vec<u8>,
        _options: CompressionOptions,
    ) -> Result<CompressedPhoto, AppError> {
        Ok(CompressedPhoto {
            bytes: input,
            content_type: "image/jpeg".to_string(),
            width: 0,
            height: 0,
        })
    }
}

/// 単色グラデーションの PNG
pub fn sample_png(width: u32, height: u32) -> Result<Vec<u8>, AppError> {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 96])
    });
    let mut cursor = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image).write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}
