use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

const SUFFIX_LEN: usize = 9;

/// 変更キューのエントリを識別するID（対象エンティティのIDではない）。
///
/// `<epoch-ms>-<英数字9桁>` 形式で、プロセス内で一意になる。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(String);

impl MutationId {
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();
        Self(format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            suffix.to_ascii_lowercase()
        ))
    }

    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        Self::validate(value)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Mutation ID cannot be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<MutationId> for String {
    fn from(id: MutationId) -> Self {
        id.0
    }
}

impl FromStr for MutationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_time_prefixed_and_unique() {
        let ids: HashSet<MutationId> = (0..256).map(|_| MutationId::generate()).collect();
        assert_eq!(ids.len(), 256);

        let sample = ids.iter().next().unwrap();
        let (millis, suffix) = sample.as_str().split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), SUFFIX_LEN);
    }

    #[test]
    fn rejects_blank_ids() {
        assert!(MutationId::parse("  ").is_err());
        assert!("1700000000000-abc".parse::<MutationId>().is_ok());
    }
}
