use crate::domain::entities::offline::SyncStatus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;

type Listener = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Listener>>,
}

/// 同期状態の保持と配信。セッションごとに1つ作り、オーケストレータへ渡す。
pub struct SyncStatusStore {
    sender: watch::Sender<SyncStatus>,
    listeners: Arc<Listeners>,
}

impl SyncStatusStore {
    pub fn new(is_online: bool) -> Self {
        let (sender, _) = watch::channel(SyncStatus::new(is_online));
        Self {
            sender,
            listeners: Arc::new(Listeners::default()),
        }
    }

    pub fn current(&self) -> SyncStatus {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.sender.subscribe()
    }

    /// 登録直後に現在値で1回呼び、以後は変更のたびに呼ぶ
    pub fn on_change<F>(&self, listener: F) -> StatusSubscription
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.listeners.entries.lock() {
            entries.insert(id, listener.clone());
        }
        listener(&self.current());

        StatusSubscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// 変更を適用し、値が変わった場合だけ配信する
    pub fn update<F>(&self, apply: F) -> SyncStatus
    where
        F: FnOnce(&mut SyncStatus),
    {
        let changed = self.sender.send_if_modified(|status| {
            let before = status.clone();
            apply(status);
            *status != before
        });

        let snapshot = self.current();
        if changed {
            self.notify(&snapshot);
        }
        snapshot
    }

    fn notify(&self, status: &SyncStatus) {
        // ロック外で呼ぶ（リスナー内からの解除を許す）
        let listeners: Vec<Listener> = match self.listeners.entries.lock() {
            Ok(entries) => entries.values().cloned().collect(),
            Err(_) => return,
        };
        for listener in listeners {
            listener(status);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

impl Default for SyncStatusStore {
    fn default() -> Self {
        Self::new(true)
    }
}

/// `on_change` の登録解除ハンドル。drop しても解除されない
pub struct StatusSubscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl StatusSubscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade()
            && let Ok(mut entries) = listeners.entries.lock()
        {
            entries.remove(&self.id);
        }
    }
}
