use super::{PendingPhoto, QueuedMutation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_RETRIES_EXCEEDED: &str = "Max retries exceeded";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum DeadLetterEntry {
    Mutation(QueuedMutation),
    Photo(PendingPhoto),
}

impl DeadLetterEntry {
    pub fn entry_id(&self) -> String {
        match self {
            DeadLetterEntry::Mutation(mutation) => mutation.id.to_string(),
            DeadLetterEntry::Photo(photo) => photo.id.to_string(),
        }
    }
}

/// 再試行上限を超えたエントリの退避先。オペレーターが確認・再送できるよう残す。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: String,
    pub entry: DeadLetterEntry,
    pub reason: String,
    #[serde(default)]
    pub last_error: Option<String>,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(entry: DeadLetterEntry, reason: impl Into<String>, last_error: Option<String>) -> Self {
        Self {
            id: entry.entry_id(),
            entry,
            reason: reason.into(),
            last_error,
            failed_at: Utc::now(),
        }
    }
}
