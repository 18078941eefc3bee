use serde::{Deserialize, Serialize};
use std::fmt;

/// ホスト側の遅延実行に登録するタグ。キューごとに独立して起こせるよう分けている。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WakeTag {
    #[serde(rename = "sync-mutations")]
    Mutations,
    #[serde(rename = "sync-photos")]
    Photos,
}

impl WakeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            WakeTag::Mutations => "sync-mutations",
            WakeTag::Photos => "sync-photos",
        }
    }
}

impl fmt::Display for WakeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
