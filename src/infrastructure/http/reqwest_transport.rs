use crate::application::ports::http_transport::{
    HttpRequest, HttpResponse, HttpTransport, MultipartUpload,
};
use crate::domain::value_objects::HttpMethod;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// `timeout` が None ならクライアント既定値のまま
    pub fn new(timeout: Option<Duration>) -> Result<Self, AppError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| AppError::ConfigurationError(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn apply_headers(
        mut builder: reqwest::RequestBuilder,
        headers: &BTreeMap<String, String>,
    ) -> reqwest::RequestBuilder {
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

async fn read_response(response: reqwest::Response) -> Result<HttpResponse, AppError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|err| AppError::Network(err.to_string()))?;
    Ok(HttpResponse::new(status, body))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        debug!(
            target: "offline::http",
            method = request.method.as_str(),
            url = %request.url,
            "sending request"
        );
        let mut builder = self
            .client
            .request(to_method(request.method), request.url.as_str());
        builder = Self::apply_headers(builder, &request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;
        read_response(response).await
    }

    async fn upload(&self, upload: MultipartUpload) -> Result<HttpResponse, AppError> {
        debug!(
            target: "offline::http",
            url = %upload.url,
            filename = %upload.filename,
            bytes = upload.bytes.len(),
            "uploading file"
        );
        let part = Part::bytes(upload.bytes)
            .file_name(upload.filename)
            .mime_str(&upload.content_type)
            .map_err(|err| AppError::InvalidInput(err.to_string()))?;
        let mut form = Form::new().part(upload.field_name, part);
        for (name, value) in upload.fields {
            form = form.text(name, value);
        }

        let mut builder = self.client.post(upload.url.as_str());
        builder = Self::apply_headers(builder, &upload.headers);
        let response = builder
            .multipart(form)
            .send()
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;
        read_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_method() {
        assert_eq!(to_method(HttpMethod::Get), Method::GET);
        assert_eq!(to_method(HttpMethod::Patch), Method::PATCH);
        assert_eq!(to_method(HttpMethod::Delete), Method::DELETE);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let transport = ReqwestTransport::new(Some(Duration::from_secs(2))).unwrap();
        // ポート 9 (discard) は通常待ち受けがない
        let result = transport
            .send(HttpRequest::get("http://127.0.0.1:9/unreachable"))
            .await;
        assert!(matches!(result, Err(AppError::Network(_))));
    }
}
