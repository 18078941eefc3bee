use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 再試行間隔の曲線
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// 遅延なし。再試行の間隔は同期の起動頻度に任せる
    None,
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Backoff {
    /// `attempt` 回目の失敗後に空ける時間
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential { base_ms, max_ms } => {
                let exponent = attempt.saturating_sub(1).min(20);
                let millis = base_ms.saturating_mul(1u64 << exponent);
                let capped = if *max_ms > 0 { millis.min(*max_ms) } else { millis };
                Duration::from_millis(capped)
            }
        }
    }
}

/// 変更キューと写真キューで共有する失敗時ポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// None なら上限なし
    pub max_retries: Option<u32>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const DEFAULT_MUTATION_RETRIES: u32 = 5;

    pub fn bounded(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
            backoff: Backoff::None,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            max_retries: None,
            backoff: Backoff::None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn mutation_default() -> Self {
        Self::bounded(Self::DEFAULT_MUTATION_RETRIES)
    }

    pub fn photo_default() -> Self {
        Self::unbounded()
    }

    /// 再試行回数が上限を超えたか
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        self.max_retries.is_some_and(|max| retry_count > max)
    }
}
