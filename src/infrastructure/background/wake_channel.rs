use crate::application::ports::deferred_wake::{DeferredWake, WakeReceiver};
use crate::domain::value_objects::WakeTag;
use crate::shared::error::AppError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

const WAKE_CAPACITY: usize = 16;

/// プロセス内で完結する遅延実行。受信側はバックグラウンド同期ループが持つ。
///
/// 要求はキュー全体の消化を促すだけなので、溜まっている間の追加分は捨てる。
#[derive(Clone)]
pub struct ChannelWake {
    sender: mpsc::Sender<WakeTag>,
}

impl ChannelWake {
    pub fn new() -> (Self, WakeReceiver) {
        Self::with_capacity(WAKE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, WakeReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl DeferredWake for ChannelWake {
    fn request_wake(&self, tag: WakeTag) -> Result<(), AppError> {
        match self.sender.try_send(tag) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(tag)) => {
                debug!(target: "offline::sync", tag = %tag, "wake request coalesced");
                Ok(())
            }
            Err(TrySendError::Closed(tag)) => Err(AppError::Internal(format!(
                "Wake receiver dropped: {tag}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_tags_in_order() {
        let (wake, mut receiver) = ChannelWake::new();
        wake.request_wake(WakeTag::Photos).unwrap();
        wake.request_wake(WakeTag::Mutations).unwrap();

        assert_eq!(receiver.recv().await, Some(WakeTag::Photos));
        assert_eq!(receiver.recv().await, Some(WakeTag::Mutations));
    }

    #[test]
    fn full_channel_drops_extra_requests() {
        let (wake, mut receiver) = ChannelWake::with_capacity(2);
        for _ in 0..10 {
            assert!(wake.request_wake(WakeTag::Mutations).is_ok());
        }

        assert_eq!(receiver.try_recv(), Ok(WakeTag::Mutations));
        assert_eq!(receiver.try_recv(), Ok(WakeTag::Mutations));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_an_error() {
        let (wake, receiver) = ChannelWake::new();
        drop(receiver);
        assert!(wake.request_wake(WakeTag::Mutations).is_err());
    }
}
