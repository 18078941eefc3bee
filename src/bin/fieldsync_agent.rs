use anyhow::Result;
use fieldsync_lib::shared::config::AppConfig;
use fieldsync_lib::state::EngineState;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    fieldsync_lib::init_logging();

    let config = AppConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    info!("Starting fieldsync agent v{}", env!("CARGO_PKG_VERSION"));
    let mut state = EngineState::initialize(config).await?;

    let status = state.sync.refresh_pending_counts().await?;
    info!(
        pending_mutations = status.pending_mutations,
        pending_photos = status.pending_photos,
        online = status.is_online,
        "offline queues loaded"
    );

    let _subscription = state.sync.on_sync_status_change(|status| {
        info!(
            syncing = status.is_syncing,
            online = status.is_online,
            pending_mutations = status.pending_mutations,
            pending_photos = status.pending_photos,
            error = status.error.as_deref().unwrap_or(""),
            "sync status"
        );
    });

    state.start().await;
    if !state.config.sync.auto_sync {
        let outcome = state
            .sync
            .sync_data(&state.config.api.base_url, state.config.api.auth_header.as_deref())
            .await;
        info!(success = outcome.success, "one-shot sync finished");
        state.shutdown().await;
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    state.shutdown().await;

    Ok(())
}
