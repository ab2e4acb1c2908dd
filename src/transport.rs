//! HTTP seam between the pipeline and the backend.
//!
//! ARCHITECTURE
//! ============
//! `Transport` performs exactly one round trip and reports every HTTP status
//! as `Ok`; only network-level failures are `Err`. Status interpretation
//! belongs to the pipeline. `HttpTransport` keeps a cookie jar so the
//! backend's httpOnly refresh cookie rides along on every call without the
//! client ever reading it.

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::types::Credential;

/// Correlation id attached to every round trip; also logged.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

/// One outgoing call, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub bearer: Option<Credential>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, bearer: None }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` as the JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `Parse` if `body` cannot be represented as JSON.
    pub fn json_from<T: serde::Serialize>(self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(self.json(value))
    }
}

/// Raw response: status plus undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, body: body.into() }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Turn a non-success response into `ApiError::Status`.
    ///
    /// # Errors
    ///
    /// Returns the backend's status and message when the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() { Ok(self) } else { Err(ApiError::from_body(self.status, &self.body)) }
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Perform one round trip.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

// =============================================================================
// REQWEST TRANSPORT
// =============================================================================

pub struct HttpTransport {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Build a transport with a cookie jar and the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the TLS backend cannot be initialized.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, config: config.clone() })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.config.url(&request.path);
        let request_id = Uuid::new_v4();
        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Patch => self.http.patch(&url),
            Method::Delete => self.http.delete(&url),
        };
        builder = builder.header(REQUEST_ID_HEADER, request_id.to_string());
        if let Some(credential) = &request.bearer {
            builder = builder.header(AUTHORIZATION, credential.bearer());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| ApiError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| ApiError::Request(e.to_string()))?;

        tracing::debug!(%request_id, method = ?request.method, path = %request.path, status, "request completed");
        Ok(ApiResponse { status, body: body.to_vec() })
    }
}
