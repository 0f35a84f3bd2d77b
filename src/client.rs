//! Thin JSON client for the gateway under test.

use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to the gateway.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The response status differs from the one the caller asked for.
    #[error("{method} {path} expected {expected} but got {actual}:\n{body}")]
    UnexpectedStatus {
        method: Method,
        path: String,
        expected: StatusCode,
        actual: StatusCode,
        body: String,
    },
    /// The response body could not be decoded into the expected shape.
    #[error("{method} {path} returned an unexpected payload ({source}):\n{body}")]
    Decode {
        method: Method,
        path: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },
    /// The request never produced a response.
    #[error("{method} {path} failed: {source}")]
    Transport {
        method: Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// Status the gateway answered with, when there was an answer.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::UnexpectedStatus { actual, .. } => Some(*actual),
            _ => None,
        }
    }

    /// Whether the failure may clear up on its own: the resource is not visible yet (404) or
    /// the gateway or a service behind it is temporarily failing (5xx).
    pub fn is_transient(&self) -> bool {
        self.status()
            .map(|s| s == StatusCode::NOT_FOUND || s.is_server_error())
            .unwrap_or(false)
    }
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub method: Method,
    pub path: String,
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|source| ApiError::Decode {
            method: self.method.clone(),
            path: self.path.clone(),
            body: self.body.clone(),
            source,
        })
    }

    /// Fail with `UnexpectedStatus` unless the status is one of `allowed`.
    pub fn expect_one_of(self, allowed: &[StatusCode]) -> Result<Self, ApiError> {
        if allowed.contains(&self.status) {
            return Ok(self);
        }
        Err(ApiError::UnexpectedStatus {
            expected: allowed.first().copied().unwrap_or(StatusCode::OK),
            method: self.method,
            path: self.path,
            actual: self.status,
            body: self.body,
        })
    }
}

/// Client bound to one gateway base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client; `timeout` bounds every individual request.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(http, base_url))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one request.
    ///
    /// `expected`, when set, turns any other status into `ApiError::UnexpectedStatus`.
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
        expected: Option<StatusCode>,
    ) -> Result<ApiResponse, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method.clone(), url.as_str())
            .header(header::ACCEPT, "application/json");
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let transport = |source: reqwest::Error| ApiError::Transport {
            method: method.clone(),
            path: path.to_string(),
            source,
        };
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport)?;
        tracing::debug!(%method, path, status = status.as_u16(), "gateway response");

        let response = ApiResponse { method, path: path.to_string(), status, body: text };
        match expected {
            Some(code) => response.expect_one_of(&[code]),
            None => Ok(response),
        }
    }

    /// `GET` without a body.
    pub async fn get(
        &self,
        path: &str,
        token: Option<&str>,
        expected: Option<StatusCode>,
    ) -> Result<ApiResponse, ApiError> {
        self.request::<()>(Method::GET, path, token, None, expected).await
    }

    /// `GET` expecting `200 OK`, decoded as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        self.get(path, token, Some(StatusCode::OK)).await?.json()
    }
}
