use crate::domain::value_objects::{HttpMethod, MutationId, MutationKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// ネットワークに届かなかった（または先回りで積んだ）書き込み要求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    pub id: MutationId,
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// エポックミリ秒。挿入順に単調非減少
    pub timestamp: i64,
    #[serde(default)]
    pub retry_count: u32,
    pub action: MutationKind,
    pub entity_type: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub next_attempt_at: Option<i64>,
}

impl QueuedMutation {
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.next_attempt_at.is_none_or(|at| at <= now_ms)
    }

    /// 同じエンティティへの書き込みをまとめるキー。ID が無ければ URL で代用する
    pub fn ordering_key(&self) -> String {
        match &self.entity_id {
            Some(entity_id) => format!("{}:{}", self.entity_type, entity_id),
            None => format!("{}@{}", self.entity_type, self.url),
        }
    }
}

/// 書き込み要求の入力。`queue_mutation` と `mutate_with_queue` が受け取る。
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub action: MutationKind,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub url: String,
    pub method: HttpMethod,
    pub data: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

impl MutationRequest {
    pub fn new(
        action: MutationKind,
        entity_type: impl Into<String>,
        url: impl Into<String>,
        method: HttpMethod,
    ) -> Self {
        Self {
            action,
            entity_type: entity_type.into(),
            entity_id: None,
            url: url.into(),
            method,
            data: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_auth(self, auth_header: Option<&str>) -> Self {
        match auth_header {
            Some(value) => self.with_header("Authorization", value),
            None => self,
        }
    }
}

/// 変更1件の処理結果の通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationProcessed {
    pub id: MutationId,
    pub success: bool,
    pub error: Option<String>,
}
