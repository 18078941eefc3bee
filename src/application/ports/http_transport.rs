use crate::domain::value_objects::HttpMethod;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const AUTHORIZATION: &str = "Authorization";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_auth(mut self, auth_header: Option<&str>) -> Self {
        if let Some(value) = auth_header {
            self.headers.insert(AUTHORIZATION.to_string(), value.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 非 2xx を `AppError::HttpStatus` に変換する
    pub fn error_for_status(self) -> Result<Self, AppError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AppError::HttpStatus(self.status))
        }
    }

    /// 空ボディは `null` として扱う
    pub fn json(&self) -> Result<Value, AppError> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body)
            .map_err(|err| AppError::DeserializationError(err.to_string()))
    }
}

/// multipart/form-data でのファイル送信
#[derive(Clone)]
pub struct MultipartUpload {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub field_name: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub fields: Vec<(String, String)>,
}

impl fmt::Debug for MultipartUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartUpload")
            .field("url", &self.url)
            .field("field_name", &self.field_name)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .field("fields", &self.fields)
            .finish()
    }
}

/// エンジンからネットワークへの唯一の出口。
///
/// `Err` は到達失敗（接続拒否・DNS・TLS 等）のみを表し、HTTP ステータスは
/// 呼び出し側が [`HttpResponse::is_success`] で判定する。
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError>;
    async fn upload(&self, upload: MultipartUpload) -> Result<HttpResponse, AppError>;
}

pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://api.example.com/api/", "/stock-control/inventory"),
            "https://api.example.com/api/stock-control/inventory"
        );
        assert_eq!(
            join_url("https://api.example.com", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn empty_body_decodes_as_null() {
        assert_eq!(HttpResponse::new(204, "").json().unwrap(), Value::Null);
        assert!(HttpResponse::new(200, "<html>").json().is_err());
        assert!(matches!(
            HttpResponse::new(502, "").error_for_status(),
            Err(AppError::HttpStatus(502))
        ));
    }
}
