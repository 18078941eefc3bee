//! 現場端末向けのローカルファースト同期エンジン。
//!
//! 読み取りはキャッシュへ、書き込みと写真はキューへ逃がし、接続が戻ったら
//! [`application::services::SyncService`] がまとめてサーバーと突き合わせる。

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

#[doc(hidden)]
pub mod test_support;

/// `RUST_LOG` があればそれを、無ければ `fieldsync=debug,offline=debug,info` を使う
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldsync=debug,offline=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
