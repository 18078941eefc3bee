use crate::domain::value_objects::WakeTag;
use crate::shared::error::AppError;
use tokio::sync::mpsc;

/// プロセス内の遅延実行要求の受信側
pub type WakeReceiver = mpsc::Receiver<WakeTag>;

/// ホストが提供する遅延実行の登録口。無い環境ではタイマーと接続イベントだけで同期する。
pub trait DeferredWake: Send + Sync {
    fn request_wake(&self, tag: WakeTag) -> Result<(), AppError>;
}
