#![allow(dead_code)]

use fieldsync_lib::domain::entities::offline::MutationRequest;
use fieldsync_lib::domain::value_objects::{HttpMethod, MutationKind};
use fieldsync_lib::shared::config::AppConfig;
use fieldsync_lib::state::EngineState;
use fieldsync_lib::test_support::{
    MockResponse, MockTransport, PassthroughCompressor, memory_store,
};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const BASE: &str = "https://api.example.com/api";
pub const WAIT: Duration = Duration::from_secs(5);

pub struct TestEngine {
    pub state: EngineState,
    pub transport: Arc<MockTransport>,
}

pub async fn setup_engine() -> TestEngine {
    setup_engine_with(|_| {}).await
}

pub async fn setup_engine_with<F>(configure: F) -> TestEngine
where
    F: FnOnce(&mut AppConfig),
{
    let mut config = AppConfig::default();
    config.api.base_url = BASE.to_string();
    config.sync.auto_sync = false;
    configure(&mut config);

    let store = memory_store().await.expect("in-memory store");
    let transport = Arc::new(MockTransport::new());
    // 一覧取得は既定で空配列を返す
    transport.respond(
        Some(HttpMethod::Get),
        "/stock-control/",
        MockResponse::json(json!([])),
    );

    let state = EngineState::assemble(
        config,
        store,
        transport.clone(),
        Arc::new(PassthroughCompressor),
    );
    TestEngine { state, transport }
}

pub fn item_url(path: &str) -> String {
    format!("{BASE}/stock-control/{path}")
}

pub fn update_stock(id: &str, quantity: i64) -> MutationRequest {
    MutationRequest::new(
        MutationKind::Update,
        "stock_item",
        item_url(&format!("inventory/{id}")),
        HttpMethod::Put,
    )
    .with_entity_id(id)
    .with_data(json!({ "quantity": quantity }))
}

pub fn body_of(value: Option<&String>) -> Value {
    value
        .map(|body| serde_json::from_str(body).expect("json body"))
        .unwrap_or(Value::Null)
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting for background work")
}
