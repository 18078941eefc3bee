use crate::application::ports::http_transport::{HttpRequest, HttpTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 端末の接続状態フラグ。ホストの接続イベントか HTTP プローブで更新する。
#[derive(Clone)]
pub struct ConnectivityMonitor {
    sender: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (sender, _receiver) = watch::channel(initially_online);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// 値が変わったときだけ購読者に通知する
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(target: "offline::connectivity", online, "connectivity changed");
        }
        changed
    }

    /// 応答があれば（ステータス不問）オンライン、到達失敗ならオフラインとみなす
    pub fn spawn_probe(
        &self,
        transport: Arc<dyn HttpTransport>,
        url: String,
        interval: Duration,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let online = match transport.send(HttpRequest::get(url.as_str())).await {
                    Ok(response) => {
                        debug!(
                            target: "offline::connectivity",
                            status = response.status,
                            "probe reached server"
                        );
                        true
                    }
                    Err(err) => {
                        debug!(
                            target: "offline::connectivity",
                            error = %err,
                            "probe failed"
                        );
                        false
                    }
                };
                monitor.set_online(online);
            }
        })
    }
}
