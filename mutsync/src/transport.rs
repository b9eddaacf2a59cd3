use crate::error::MutationError;
use crate::idempotency::{IdempotencyKey, IDEMPOTENCY_HEADER};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Response};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

/// One outbound attempt.
#[derive(Clone, Copy, Debug)]
pub struct MutationRequest<'a> {
    pub endpoint: &'a str,
    pub body: &'a JsonValue,
    pub idempotency_key: &'a IdempotencyKey,
    pub timeout: Duration,
}

/// Issues a single mutation attempt. No retries happen at this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, req: MutationRequest<'_>) -> Result<JsonValue, MutationError>;
}

#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, MutationError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let ua = format!("mutsync/{} {}", env!("CARGO_PKG_VERSION"), std::env::consts::OS);
        if let Ok(v) = HeaderValue::from_str(&ua) {
            headers.insert(USER_AGENT, v);
        }
        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| MutationError::Network(e.to_string()))?;
        Ok(Self { http })
    }

    pub fn client(&self) -> &Client {
        &self.http
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, req: MutationRequest<'_>) -> Result<JsonValue, MutationError> {
        let url = reqwest::Url::parse(req.endpoint).map_err(|e| MutationError::InvalidEndpoint {
            endpoint: req.endpoint.to_string(),
            reason: e.to_string(),
        })?;
        debug!(endpoint = %url, key = %req.idempotency_key, "post mutation");
        // dropping the exchange future aborts the in-flight request
        match tokio::time::timeout(req.timeout, self.exchange(url, req)).await {
            Ok(result) => result,
            Err(_) => Err(MutationError::Timeout(req.timeout)),
        }
    }
}

impl HttpTransport {
    async fn exchange(&self, url: reqwest::Url, req: MutationRequest<'_>) -> Result<JsonValue, MutationError> {
        let resp = self
            .http
            .post(url)
            .header(IDEMPOTENCY_HEADER, req.idempotency_key.as_str())
            .json(req.body)
            .send()
            .await
            .map_err(|e| MutationError::from_reqwest(e, req.timeout))?;
        if resp.status().is_success() {
            parse_json(resp, req.timeout).await
        } else {
            Err(http_error(resp).await)
        }
    }
}

async fn parse_json(resp: Response, timeout: Duration) -> Result<JsonValue, MutationError> {
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| MutationError::from_reqwest(e, timeout))?;
    if bytes.is_empty() {
        return Ok(JsonValue::Null);
    }
    let v: JsonValue = serde_json::from_slice(&bytes)
        .unwrap_or(JsonValue::String(String::from_utf8_lossy(&bytes).to_string()));
    Ok(v)
}

async fn http_error(resp: Response) -> MutationError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<JsonValue>(&text).ok();
    let message = body
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    MutationError::Http {
        status: status.as_u16(),
        message,
        body: body.or_else(|| (!text.is_empty()).then(|| JsonValue::String(text))),
    }
}
