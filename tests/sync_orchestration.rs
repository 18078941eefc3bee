mod common;

use common::{BASE, item_url, setup_engine, setup_engine_with, update_stock, within};
use fieldsync_lib::application::services::AuthProvider;
use fieldsync_lib::domain::entities::offline::{MutationRequest, PhotoUploadRequest, SyncStatus};
use fieldsync_lib::domain::value_objects::{HttpMethod, MutationId, MutationKind};
use fieldsync_lib::test_support::MockResponse;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

fn background_auth() -> AuthProvider {
    Arc::new(|| Some("Bearer background".to_string()))
}

fn job_card_photo(depends_on: Option<MutationId>) -> PhotoUploadRequest {
    PhotoUploadRequest {
        entity_type: "job_card".into(),
        entity_id: "JC-1".into(),
        file: vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3],
        filename: "site.heic".into(),
        upload_url: item_url("job-cards/JC-1/photos"),
        auth_header: None,
        depends_on,
    }
}

#[tokio::test]
async fn status_listener_sees_pass_and_can_unsubscribe() {
    let engine = setup_engine().await;
    let seen: Arc<Mutex<Vec<SyncStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let subscription = engine
        .state
        .sync
        .on_sync_status_change(move |status| sink.lock().unwrap().push(status.clone()));
    assert_eq!(seen.lock().unwrap().len(), 1);

    engine
        .state
        .mutations
        .queue_mutation(update_stock("1", 1))
        .await
        .unwrap();
    let outcome = engine.state.sync.sync_data(BASE, None).await;
    assert!(outcome.success);

    {
        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|status| status.is_syncing));
        let last = seen.last().unwrap();
        assert!(!last.is_syncing);
        assert!(last.last_sync_at.is_some());
        assert_eq!(last.pending_mutations, 0);
        assert!(last.error.is_none());
    }

    subscription.unsubscribe();
    let observed = seen.lock().unwrap().len();
    engine
        .state
        .mutations
        .queue_mutation(update_stock("2", 2))
        .await
        .unwrap();
    let status = engine.state.sync.refresh_pending_counts().await.unwrap();
    assert_eq!(status.pending_mutations, 1);
    assert_eq!(seen.lock().unwrap().len(), observed);
}

#[tokio::test]
async fn listener_sees_offline_writes_without_background_sync() {
    let engine = setup_engine().await;
    let seen: Arc<Mutex<Vec<SyncStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = engine
        .state
        .sync
        .on_sync_status_change(move |status| sink.lock().unwrap().push(status.clone()));
    assert!(!engine.state.sync.is_background_running().await);

    let mut status = engine.state.sync.subscribe_status();
    engine.state.connectivity.set_online(false);
    within(status.wait_for(|status| !status.is_online))
        .await
        .expect("status channel");

    let response = engine
        .state
        .client
        .mutate_with_queue(update_stock("8", 4))
        .await
        .expect("queued");
    assert_eq!(response.data["queued"], json!(true));
    within(status.wait_for(|status| status.pending_mutations == 1))
        .await
        .expect("status channel");

    let seen = seen.lock().unwrap();
    assert!(seen.iter().any(|status| !status.is_online));
    let last = seen.last().unwrap();
    assert_eq!(last.pending_mutations, 1);
    assert!(!last.is_online);
    assert!(!last.is_syncing);
}

#[tokio::test]
async fn photo_waits_for_its_mutation() {
    let engine = setup_engine().await;
    engine.transport.respond(
        Some(HttpMethod::Put),
        "/job-cards/JC-1",
        MockResponse::status(503, ""),
    );
    let mutation_id = engine
        .state
        .mutations
        .queue_mutation(
            MutationRequest::new(
                MutationKind::Update,
                "job_card",
                item_url("job-cards/JC-1"),
                HttpMethod::Put,
            )
            .with_entity_id("JC-1")
            .with_data(json!({"status": "done"})),
        )
        .await
        .unwrap();
    engine
        .state
        .photos
        .queue_photo_upload(job_card_photo(Some(mutation_id)))
        .await
        .unwrap();

    let first = engine.state.sync.sync_data(BASE, None).await.report.unwrap();
    assert_eq!(first.mutations.failed, 1);
    assert_eq!(first.photos.deferred, 1);
    assert_eq!(first.photos.synced, 0);
    assert!(engine.transport.calls().iter().all(|call| call.upload.is_none()));

    engine.transport.respond(
        Some(HttpMethod::Put),
        "/job-cards/JC-1",
        MockResponse::json(json!({"id": "JC-1", "status": "done"})),
    );
    let second = engine.state.sync.sync_data(BASE, None).await.report.unwrap();
    assert_eq!(second.mutations.succeeded, 1);
    assert_eq!(second.photos.synced, 1);

    let uploads: Vec<_> = engine
        .transport
        .calls()
        .into_iter()
        .filter_map(|call| call.upload)
        .collect();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].field_name, "file");
    assert_eq!(uploads[0].filename, "site.jpg");
    assert!(
        uploads[0]
            .fields
            .contains(&("entityId".to_string(), "JC-1".to_string()))
    );

    assert_eq!(engine.state.photos.pending_count().await.unwrap(), 0);
    let kept = engine.state.photos.all_photos().await.unwrap();
    assert_eq!(kept.len(), 1);
    assert!(kept[0].synced);
    assert_eq!(engine.state.sync.status().pending_photos, 0);
}

#[tokio::test]
async fn wake_requests_drain_only_their_queue() {
    let engine = setup_engine().await;
    let sync = &engine.state.sync;
    let mut status = sync.subscribe_status();

    sync.start_background_sync(BASE, background_auth(), HOUR).await;
    // 起動直後の定期パスが終わるのを待つ
    within(status.wait_for(|status| status.last_sync_at.is_some() && !status.is_syncing))
        .await
        .expect("status channel");
    engine.transport.reset_calls();

    let mut pending_mutations = engine.state.mutations.subscribe_pending();
    engine
        .state
        .mutations
        .queue_mutation(update_stock("5", 9))
        .await
        .unwrap();
    within(pending_mutations.wait_for(|count| *count == 0))
        .await
        .expect("pending channel");

    let calls = engine.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, HttpMethod::Put);
    assert_eq!(
        calls[0].headers.get("Authorization").map(String::as_str),
        Some("Bearer background")
    );

    engine.transport.reset_calls();
    let mut pending_photos = engine.state.photos.subscribe_pending();
    engine
        .state
        .photos
        .queue_photo_upload(job_card_photo(None))
        .await
        .unwrap();
    within(pending_photos.wait_for(|count| *count == 0))
        .await
        .expect("pending channel");

    let calls = engine.transport.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].upload.is_some());

    sync.stop_background_sync().await;
    assert!(!sync.is_background_running().await);
}

#[tokio::test]
async fn wake_requests_are_served_after_restart() {
    let engine = setup_engine().await;
    let sync = &engine.state.sync;
    let mut status = sync.subscribe_status();

    sync.start_background_sync(BASE, background_auth(), HOUR).await;
    within(status.wait_for(|status| status.last_sync_at.is_some() && !status.is_syncing))
        .await
        .expect("status channel");
    sync.stop_background_sync().await;
    let first_pass = status.borrow_and_update().last_sync_at;

    sync.start_background_sync(BASE, background_auth(), HOUR).await;
    // 再開直後の定期パスを済ませ、以降は遅延実行だけが動くようにする
    within(status.wait_for(|status| status.last_sync_at != first_pass && !status.is_syncing))
        .await
        .expect("status channel");
    let mut pending = engine.state.mutations.subscribe_pending();
    engine
        .state
        .mutations
        .queue_mutation(update_stock("7", 2))
        .await
        .unwrap();
    within(pending.wait_for(|count| *count == 0))
        .await
        .expect("pending channel");
    assert_eq!(
        engine
            .transport
            .calls_matching(HttpMethod::Put, "/inventory/7")
            .len(),
        1
    );

    sync.stop_background_sync().await;
}

#[tokio::test]
async fn reconnect_triggers_a_full_pass() {
    let engine = setup_engine().await;
    let sync = &engine.state.sync;
    engine.state.connectivity.set_online(false);

    sync.start_background_sync(BASE, background_auth(), HOUR).await;
    engine
        .state
        .mutations
        .queue_mutation(update_stock("6", 3))
        .await
        .unwrap();
    assert!(
        engine
            .transport
            .calls_matching(HttpMethod::Put, "/inventory/6")
            .is_empty()
    );

    let mut status = sync.subscribe_status();
    let mut pending = engine.state.mutations.subscribe_pending();
    engine.state.connectivity.set_online(true);

    within(pending.wait_for(|count| *count == 0))
        .await
        .expect("pending channel");
    within(status.wait_for(|status| {
        status.is_online && status.last_sync_at.is_some() && !status.is_syncing
    }))
    .await
    .expect("status channel");

    assert_eq!(
        engine
            .transport
            .calls_matching(HttpMethod::Put, "/inventory/6")
            .len(),
        1
    );
    assert!(
        engine
            .transport
            .calls_matching(HttpMethod::Get, "/stock-control/")
            .len()
            >= 3
    );

    sync.stop_background_sync().await;
}

#[tokio::test]
async fn engine_start_and_shutdown_follow_config() {
    let mut engine = setup_engine_with(|config| config.sync.auto_sync = true).await;

    engine.state.start().await;
    assert!(engine.state.sync.is_background_running().await);

    engine.state.shutdown().await;
    assert!(!engine.state.sync.is_background_running().await);
}
