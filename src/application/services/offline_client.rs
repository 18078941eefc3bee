use super::mutation_queue::MutationQueue;
use crate::application::ports::http_transport::{HttpRequest, HttpTransport};
use crate::application::ports::offline_store::{Collection, OfflineStore, entity_key};
use crate::domain::entities::offline::{MutationRequest, RefreshReport, SyncMeta};
use crate::domain::value_objects::{CacheCollection, HttpMethod, StoreCollection};
use crate::shared::error::AppError;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const QUEUED_FOR_SYNC: &str = "Action queued for sync when online";
const OFFLINE: &str = "Device is offline";

/// 読み書きの共通応答。`from_cache` はデータの出どころを示す
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineResponse<T> {
    pub data: T,
    pub from_cache: bool,
    pub error: Option<String>,
}

impl<T> OfflineResponse<T> {
    fn fresh(data: T) -> Self {
        Self {
            data,
            from_cache: false,
            error: None,
        }
    }

    fn cached(data: T, error: String) -> Self {
        Self {
            data,
            from_cache: true,
            error: Some(error),
        }
    }
}

/// 読み取りはネットワーク優先でキャッシュへフォールバック、書き込みは失敗時にキューへ積む
pub struct OfflineClient {
    store: Arc<dyn OfflineStore>,
    transport: Arc<dyn HttpTransport>,
    mutations: Arc<MutationQueue>,
    meta: Collection<SyncMeta>,
    cache_version: String,
    connectivity: Option<watch::Receiver<bool>>,
}

impl OfflineClient {
    pub fn new(
        store: Arc<dyn OfflineStore>,
        transport: Arc<dyn HttpTransport>,
        mutations: Arc<MutationQueue>,
        cache_version: impl Into<String>,
    ) -> Self {
        Self {
            meta: Collection::new(store.clone(), StoreCollection::SyncMeta),
            store,
            transport,
            mutations,
            cache_version: cache_version.into(),
            connectivity: None,
        }
    }

    pub fn with_connectivity(mut self, connectivity: watch::Receiver<bool>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    fn cache(&self, collection: CacheCollection) -> Collection<Value> {
        Collection::new(self.store.clone(), collection.store())
    }

    fn is_offline(&self) -> bool {
        self.connectivity
            .as_ref()
            .is_some_and(|online| !*online.borrow())
    }

    pub async fn fetch_with_cache(
        &self,
        collection: CacheCollection,
        url: &str,
        id: &str,
        auth_header: Option<&str>,
    ) -> Result<OfflineResponse<Value>, AppError> {
        let fetched = if self.is_offline() {
            Err(AppError::Network(OFFLINE.to_string()))
        } else {
            self.get_json(url, auth_header).await.and_then(|value| {
                if value.is_null() {
                    Err(AppError::DeserializationError(
                        "Empty response body".to_string(),
                    ))
                } else {
                    Ok(value)
                }
            })
        };

        match fetched {
            Ok(value) => {
                if entity_key(&value).is_some() {
                    self.cache(collection).save(&value).await?;
                    self.touch_meta(collection).await?;
                } else {
                    warn!(
                        target: "offline::client",
                        collection = %collection,
                        url,
                        "response has no id, not cached"
                    );
                }
                Ok(OfflineResponse::fresh(value))
            }
            Err(err) => {
                let Some(cached) = self.cache(collection).by_id(id).await? else {
                    return Err(err);
                };
                debug!(
                    target: "offline::client",
                    collection = %collection,
                    id,
                    error = %err,
                    "serving cached record"
                );
                Ok(OfflineResponse::cached(cached, err.to_string()))
            }
        }
    }

    pub async fn fetch_list_with_cache(
        &self,
        collection: CacheCollection,
        url: &str,
        auth_header: Option<&str>,
    ) -> Result<OfflineResponse<Vec<Value>>, AppError> {
        let fetched = if self.is_offline() {
            Err(AppError::Network(OFFLINE.to_string()))
        } else {
            self.fetch_list(url, auth_header).await
        };

        match fetched {
            Ok(items) => {
                self.store_list(collection, &items).await?;
                Ok(OfflineResponse::fresh(items))
            }
            Err(err) => {
                let cached = self.cache(collection).all().await?;
                if cached.is_empty() {
                    return Err(err);
                }
                debug!(
                    target: "offline::client",
                    collection = %collection,
                    items = cached.len(),
                    error = %err,
                    "serving cached list"
                );
                Ok(OfflineResponse::cached(cached, err.to_string()))
            }
        }
    }

    /// 一覧を取得してキャッシュを上書きする。取得失敗は report に載せ、ストレージ失敗だけ返す
    pub async fn refresh_collection(
        &self,
        collection: CacheCollection,
        url: &str,
        auth_header: Option<&str>,
    ) -> Result<RefreshReport, AppError> {
        match self.fetch_list(url, auth_header).await {
            Ok(items) => {
                let written = self.store_list(collection, &items).await?;
                Ok(RefreshReport {
                    collection,
                    items: written,
                    error: None,
                })
            }
            Err(err) => {
                warn!(
                    target: "offline::client",
                    collection = %collection,
                    url,
                    error = %err,
                    "collection refresh failed"
                );
                Ok(RefreshReport {
                    collection,
                    items: 0,
                    error: Some(err.to_string()),
                })
            }
        }
    }

    pub async fn mutate_with_queue(
        &self,
        request: MutationRequest,
    ) -> Result<OfflineResponse<Value>, AppError> {
        let failure = if self.is_offline() {
            AppError::Network(OFFLINE.to_string())
        } else {
            match self.transport.send(build_request(&request)?).await {
                Ok(response) if response.is_success() => {
                    let data = response
                        .json()
                        .unwrap_or_else(|_| Value::String(response.body.clone()));
                    self.evict_deleted(&request).await?;
                    return Ok(OfflineResponse::fresh(data));
                }
                Ok(response) => AppError::HttpStatus(response.status),
                Err(err) => err,
            }
        };

        info!(
            target: "offline::client",
            method = request.method.as_str(),
            url = %request.url,
            reason = %failure,
            "write queued for later sync"
        );
        let id = self.mutations.queue_mutation(request).await?;
        Ok(OfflineResponse {
            data: json!({ "queued": true, "mutationId": id }),
            from_cache: false,
            error: Some(QUEUED_FOR_SYNC.to_string()),
        })
    }

    pub async fn sync_meta(&self, collection: CacheCollection) -> Result<Option<SyncMeta>, AppError> {
        self.meta.by_id(collection.as_str()).await
    }

    pub async fn cached_item(
        &self,
        collection: CacheCollection,
        id: &str,
    ) -> Result<Option<Value>, AppError> {
        self.cache(collection).by_id(id).await
    }

    pub async fn cached_list(&self, collection: CacheCollection) -> Result<Vec<Value>, AppError> {
        self.cache(collection).all().await
    }

    async fn evict_deleted(&self, request: &MutationRequest) -> Result<(), AppError> {
        if request.method != HttpMethod::Delete {
            return Ok(());
        }
        if let (Some(collection), Some(id)) = (
            CacheCollection::from_entity_type(&request.entity_type),
            request.entity_id.as_deref(),
        ) && self.cache(collection).remove(id).await?
        {
            debug!(target: "offline::client", collection = %collection, id, "cached record removed");
        }
        Ok(())
    }

    async fn get_json(&self, url: &str, auth_header: Option<&str>) -> Result<Value, AppError> {
        let response = self
            .transport
            .send(HttpRequest::get(url).with_auth(auth_header))
            .await?
            .error_for_status()?;
        response.json()
    }

    async fn fetch_list(&self, url: &str, auth_header: Option<&str>) -> Result<Vec<Value>, AppError> {
        let body = self.get_json(url, auth_header).await?;
        extract_list(body)
    }

    async fn store_list(
        &self,
        collection: CacheCollection,
        items: &[Value],
    ) -> Result<usize, AppError> {
        let (keyed, unkeyed): (Vec<&Value>, Vec<&Value>) =
            items.iter().partition(|item| entity_key(item).is_some());
        if !unkeyed.is_empty() {
            warn!(
                target: "offline::client",
                collection = %collection,
                skipped = unkeyed.len(),
                "list items without id were not cached"
            );
        }

        let keyed: Vec<Value> = keyed.into_iter().cloned().collect();
        let written = self.cache(collection).save_all(&keyed).await?;
        self.touch_meta(collection).await?;
        Ok(written)
    }

    async fn touch_meta(&self, collection: CacheCollection) -> Result<(), AppError> {
        self.meta
            .save(&SyncMeta::synced_now(collection, self.cache_version.as_str()))
            .await
    }
}

/// 素の配列、または `items` / `data` に配列を持つエンベロープを受け付ける
fn extract_list(body: Value) -> Result<Vec<Value>, AppError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut envelope) => match ["items", "data"]
            .iter()
            .find_map(|key| match envelope.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }) {
            Some(items) => Ok(items),
            None => Err(AppError::DeserializationError(
                "List response has no items array".to_string(),
            )),
        },
        other => Err(AppError::DeserializationError(format!(
            "Unexpected list response: {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn build_request(request: &MutationRequest) -> Result<HttpRequest, AppError> {
    let body = request
        .data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let mut headers = request.headers.clone();
    if body.is_some()
        && !headers
            .keys()
            .any(|key| key.eq_ignore_ascii_case("Content-Type"))
    {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }
    Ok(HttpRequest {
        method: request.method,
        url: request.url.clone(),
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::dead_letters::DeadLetterBox;
    use crate::domain::value_objects::{MutationKind, RetryPolicy};
    use crate::test_support::{MockResponse, MockTransport, memory_store};

    const BASE: &str = "https://api.example.com/api";

    struct Fixture {
        client: OfflineClient,
        queue: Arc<MutationQueue>,
        transport: Arc<MockTransport>,
    }

    async fn setup() -> Fixture {
        let store = memory_store().await.unwrap();
        let transport = Arc::new(MockTransport::new());
        let queue = Arc::new(MutationQueue::new(
            store.clone(),
            transport.clone(),
            DeadLetterBox::new(store.clone()),
            RetryPolicy::mutation_default(),
        ));
        let client = OfflineClient::new(store, transport.clone(), queue.clone(), "1");
        Fixture {
            client,
            queue,
            transport,
        }
    }

    #[test]
    fn extracts_lists_from_envelopes() {
        assert_eq!(extract_list(json!([{"id": 1}])).unwrap().len(), 1);
        assert_eq!(extract_list(json!({"items": [{"id": 1}, {"id": 2}]})).unwrap().len(), 2);
        assert_eq!(extract_list(json!({"data": []})).unwrap().len(), 0);
        assert!(extract_list(json!({"total": 3})).is_err());
        assert!(extract_list(Value::Null).is_err());
    }

    #[tokio::test]
    async fn test_list_fetch_persists_and_updates_meta() {
        let fixture = setup().await;
        let url = format!("{BASE}/stock-control/inventory");
        fixture.transport.respond(
            Some(HttpMethod::Get),
            "/stock-control/inventory",
            MockResponse::json(json!({"items": [{"id": 1, "qty": 4}, {"name": "no id"}]})),
        );

        let response = fixture
            .client
            .fetch_list_with_cache(CacheCollection::StockItems, &url, None)
            .await
            .unwrap();

        assert!(!response.from_cache);
        assert_eq!(response.data.len(), 2);
        let cached = fixture
            .client
            .cached_list(CacheCollection::StockItems)
            .await
            .unwrap();
        assert_eq!(cached, vec![json!({"id": 1, "qty": 4})]);
        let meta = fixture
            .client
            .sync_meta(CacheCollection::StockItems)
            .await
            .unwrap()
            .unwrap();
        assert!(meta.last_sync.is_some());
        assert_eq!(meta.version, "1");
    }

    #[tokio::test]
    async fn test_list_falls_back_to_cache() {
        let fixture = setup().await;
        let url = format!("{BASE}/stock-control/job-cards");
        fixture.transport.respond(
            Some(HttpMethod::Get),
            "/job-cards",
            MockResponse::json(json!([{"id": 10}])),
        );
        fixture
            .client
            .fetch_list_with_cache(CacheCollection::JobCards, &url, None)
            .await
            .unwrap();

        fixture.transport.set_offline(true);
        let response = fixture
            .client
            .fetch_list_with_cache(CacheCollection::JobCards, &url, None)
            .await
            .unwrap();

        assert!(response.from_cache);
        assert_eq!(response.data, vec![json!({"id": 10})]);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn test_empty_cache_propagates_error() {
        let fixture = setup().await;
        fixture.transport.set_offline(true);

        let result = fixture
            .client
            .fetch_list_with_cache(
                CacheCollection::DeliveryNotes,
                &format!("{BASE}/stock-control/deliveries"),
                None,
            )
            .await;

        assert!(matches!(result, Err(AppError::Network(_))));
    }

    #[tokio::test]
    async fn test_undecodable_body_uses_cache() {
        let fixture = setup().await;
        let url = format!("{BASE}/stock-control/inventory/5");
        fixture.transport.respond(
            Some(HttpMethod::Get),
            "/inventory/5",
            MockResponse::json(json!({"id": 5, "qty": 1})),
        );
        fixture
            .client
            .fetch_with_cache(CacheCollection::StockItems, &url, "5", None)
            .await
            .unwrap();

        fixture.transport.respond(
            Some(HttpMethod::Get),
            "/inventory/5",
            MockResponse::status(200, "<html>maintenance</html>"),
        );
        let response = fixture
            .client
            .fetch_with_cache(CacheCollection::StockItems, &url, "5", None)
            .await
            .unwrap();

        assert!(response.from_cache);
        assert_eq!(response.data, json!({"id": 5, "qty": 1}));
    }

    #[tokio::test]
    async fn test_successful_write_returns_server_data() {
        let fixture = setup().await;
        fixture.transport.respond(
            Some(HttpMethod::Post),
            "/job-cards",
            MockResponse::json(json!({"id": 77})),
        );

        let response = fixture
            .client
            .mutate_with_queue(
                MutationRequest::new(
                    MutationKind::Create,
                    "job_card",
                    format!("{BASE}/stock-control/job-cards"),
                    HttpMethod::Post,
                )
                .with_data(json!({"title": "Pump"})),
            )
            .await
            .unwrap();

        assert_eq!(response.data, json!({"id": 77}));
        assert!(response.error.is_none());
        assert_eq!(fixture.queue.pending_count().await.unwrap(), 0);
        let calls = fixture.transport.calls();
        assert_eq!(calls[0].body.as_deref(), Some(r#"{"title":"Pump"}"#));
    }

    #[tokio::test]
    async fn test_successful_delete_evicts_cache() {
        let fixture = setup().await;
        let list_url = format!("{BASE}/stock-control/inventory");
        fixture.transport.respond(
            Some(HttpMethod::Get),
            "/inventory",
            MockResponse::json(json!([{"id": 1}, {"id": 2}])),
        );
        fixture
            .client
            .fetch_list_with_cache(CacheCollection::StockItems, &list_url, None)
            .await
            .unwrap();
        fixture
            .transport
            .respond(Some(HttpMethod::Delete), "/inventory/2", MockResponse::status(204, ""));

        let response = fixture
            .client
            .mutate_with_queue(
                MutationRequest::new(
                    MutationKind::Delete,
                    "stock_item",
                    format!("{list_url}/2"),
                    HttpMethod::Delete,
                )
                .with_entity_id("2"),
            )
            .await
            .unwrap();

        assert_eq!(response.data, Value::Null);
        let cached = fixture
            .client
            .cached_list(CacheCollection::StockItems)
            .await
            .unwrap();
        assert_eq!(cached, vec![json!({"id": 1})]);
    }

    #[tokio::test]
    async fn test_offline_receiver_skips_network() {
        let fixture = setup().await;
        let (online_tx, online_rx) = watch::channel(false);
        let client = fixture.client.with_connectivity(online_rx);

        let response = client
            .mutate_with_queue(MutationRequest::new(
                MutationKind::Update,
                "job_card",
                format!("{BASE}/stock-control/job-cards/3"),
                HttpMethod::Patch,
            ))
            .await
            .unwrap();

        assert_eq!(response.data["queued"], json!(true));
        assert!(fixture.transport.calls().is_empty());
        assert_eq!(fixture.queue.pending_count().await.unwrap(), 1);
        drop(online_tx);
    }
}
