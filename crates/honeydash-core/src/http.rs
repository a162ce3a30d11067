// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! Transport to the HoneyDash control API.
//!
//! Each call is one JSON request/response exchange. Network and decoding
//! failures are folded into [`TransportError`] so callers always receive a
//! tagged result. HTTP status codes are deliberately not classified here: the
//! control API reports operation failures in the JSON body
//! (`{"success": false, ...}`) alongside 4xx/5xx codes, and the body is what
//! the upper layers interpret.
//!
//! There are no retries and no request timeout; an in-flight call runs to
//! completion or failure.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::HoneydashConfig;

/// Failure to complete a request/response exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, TLS or I/O failure.
    #[error("request to {path} failed: {message}")]
    Network { path: String, message: String },
    /// The response body was not JSON.
    #[error("response from {path} is not valid JSON (status {status}): {message}")]
    Decode {
        path: String,
        status: u16,
        message: String,
    },
    /// The endpoint could not be joined onto the base URL.
    #[error("invalid request target: {0}")]
    InvalidUrl(String),
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// A single call against the control API, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the base URL, always starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds the parameter only when a value is present.
    #[must_use]
    pub fn query_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Request/response exchange against the control API.
///
/// Implemented by [`HttpTransport`] in production; tests inject in-memory
/// doubles.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: ApiRequest) -> Result<Value, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn call(&self, request: ApiRequest) -> Result<Value, TransportError> {
        (**self).call(request).await
    }
}

/// reqwest-backed [`Transport`] bound to a base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Builds a transport from the client configuration.
    ///
    /// The base URL is injected here rather than read from global state so
    /// tests can point the transport at a mock server.
    pub fn new(config: &HoneydashConfig) -> Result<Self, TransportError> {
        let base_url = config.api_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("honeydash/", env!("CARGO_PKG_VERSION"))),
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(proxy) = &config.https_proxy {
            let proxy =
                reqwest::Proxy::https(proxy).map_err(|e| TransportError::Client(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Returns the base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        Url::parse(&url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let url = self.endpoint(&request.path)?;
        debug!(
            method = %request.method,
            path = %request.path,
            query = ?request.query,
            has_body = request.body.is_some(),
            "control API request"
        );

        let mut builder = self.client.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let network_error = |e: reqwest::Error| TransportError::Network {
            path: request.path.clone(),
            message: e.to_string(),
        };
        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(network_error)?;

        debug!(
            method = %request.method,
            path = %request.path,
            status = %status,
            body_len = bytes.len(),
            "control API response"
        );

        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode {
            path: request.path.clone(),
            status: status.as_u16(),
            message: e.to_string(),
        })
    }
}
