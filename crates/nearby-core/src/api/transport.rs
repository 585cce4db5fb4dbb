//! HTTP transport abstraction.
//!
//! The pipeline in [`client`](crate::api::client) is written against the
//! [`Transport`] trait so the 401 recovery logic can be exercised against a
//! scripted transport in tests. Production uses [`ReqwestTransport`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api::error::ApiError;
use crate::config::Config;

/// Header carrying the session correlation id on every authenticated call.
pub const HEADER_SESSION_ID: &str = "x-session-id";
/// Fallback credential header when no valid auth token is available.
pub const HEADER_REFRESH_TOKEN: &str = "x-refresh-token";
/// Server-issued rotation signal: a replacement auth token.
pub const HEADER_NEW_AUTH_TOKEN: &str = "x-new-auth-token";

/// Description of one outbound API call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Extra headers beyond the credentials the pipeline attaches.
    pub headers: HeaderMap,
    /// Authentication is required by default; only the auth-bootstrap
    /// endpoints (initiate/verify/logout) opt out.
    pub requires_auth: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            requires_auth: true,
        }
    }

    pub fn unauthenticated(method: Method, path: impl Into<String>) -> Self {
        let mut descriptor = Self::new(method, path);
        descriptor.requires_auth = false;
        descriptor
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(
        mut self,
        name: reqwest::header::HeaderName,
        value: reqwest::header::HeaderValue,
    ) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A complete HTTP response: status, headers, body text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// A response header as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("failed to parse body: {e}")))
    }
}

/// The transport could not produce a response at all.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Dispatches one request and returns the raw response.
///
/// `headers` is the complete header set for this attempt: the pipeline
/// rebuilds credentials per attempt, so the transport never consults
/// session state.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        req: &RequestDescriptor,
        headers: HeaderMap,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    async fn send(
        &self,
        req: &RequestDescriptor,
        headers: HeaderMap,
    ) -> Result<HttpResponse, TransportError> {
        self.as_ref().send(req, headers).await
    }
}

/// Production transport backed by `reqwest`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Transport for ReqwestTransport {
    async fn send(
        &self,
        req: &RequestDescriptor,
        headers: HeaderMap,
    ) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.base_url, req.path);
        let mut builder = self
            .client
            .request(req.method.clone(), &url)
            .headers(headers);
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults_to_requiring_auth() {
        let req = RequestDescriptor::new(Method::GET, "/bookings");
        assert!(req.requires_auth);
        let req = RequestDescriptor::unauthenticated(Method::POST, "/auth/initiate");
        assert!(!req.requires_auth);
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::HeaderName::from_static(HEADER_NEW_AUTH_TOKEN),
            reqwest::header::HeaderValue::from_static("tok-2"),
        );
        let response = HttpResponse {
            status: StatusCode::UNAUTHORIZED,
            headers,
            body: String::new(),
        };
        assert_eq!(response.header("X-New-Auth-Token"), Some("tok-2"));
        assert_eq!(response.header(HEADER_NEW_AUTH_TOKEN), Some("tok-2"));
    }
}
