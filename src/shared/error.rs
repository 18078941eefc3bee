use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Database(String),
    Storage(String),
    Network(String),
    HttpStatus(u16),
    NotFound(String),
    InvalidInput(String),
    ValidationError(String),
    ConfigurationError(String),
    SerializationError(String),
    DeserializationError(String),
    Media(String),
    Internal(String),
}

impl AppError {
    /// ネットワーク到達失敗または非 2xx 応答か（キュー側で再試行される失敗）
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_) | AppError::HttpStatus(_))
    }

    /// ストレージ起因の失敗か（エンジンは再試行せず呼び出し元へ返す）
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Storage(_)
                | AppError::SerializationError(_)
                | AppError::DeserializationError(_)
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::HttpStatus(status) => write!(f, "HTTP {}", status),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            AppError::Media(msg) => write!(f, "Media error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Media(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_renders_as_reason() {
        assert_eq!(AppError::HttpStatus(503).to_string(), "HTTP 503");
    }

    #[test]
    fn classifies_transient_and_storage_failures() {
        assert!(AppError::Network("refused".into()).is_transient());
        assert!(AppError::HttpStatus(500).is_transient());
        assert!(!AppError::Database("locked".into()).is_transient());

        assert!(AppError::Database("disk full".into()).is_storage());
        assert!(!AppError::HttpStatus(404).is_storage());
    }
}
