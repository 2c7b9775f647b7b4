//! Lacework API access.
//!
//! The pipeline talks to the platform through two narrow traits so the
//! token manager and the executor can be exercised without a network:
//!
//! - [`AuthExchange`]: trade account credentials for a bearer token
//! - [`ApiTransport`]: send one authenticated request, applying the retry policy
//!
//! [`LaceworkClient`] implements both over `reqwest`.

pub mod client;
pub mod retry;

pub use client::{ClientSettings, LaceworkClient, SUBACCOUNT_HEADER};
pub use retry::RetryPolicy;

use crate::error::{ApiError, AuthError};
use crate::models::{ApiPayload, Credentials, Token};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Result of a successful credential exchange, before the lifetime is capped.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    /// Lifetime announced by the server, if it announced one.
    pub server_ttl: Option<Duration>,
}

/// Exchanges long-lived credentials for a bearer token.
#[async_trait]
pub trait AuthExchange: Send + Sync {
    async fn exchange(&self, credentials: &Credentials) -> Result<TokenGrant, AuthError>;
}

/// Sends authenticated API requests.
///
/// Implementations surface 401 as [`ApiError::Unauthorized`] without
/// retrying and report other 4xx as [`ApiError::InvalidRequest`]. Transient
/// failures are retried internally, but a token that expires between
/// attempts is never sent; that also surfaces as `Unauthorized`.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest, token: &Token) -> Result<ApiPayload, ApiError>;
}

/// HTTP verb of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
}

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiTarget {
    /// Path segments below the API root, e.g. `["Queries", "my_query", "execute"]`.
    Path(Vec<String>),
    /// Absolute continuation URL handed out by the server.
    Absolute(String),
}

/// One authenticated API call. Immutable; retries resend the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: ApiMethod,
    pub target: ApiTarget,
    pub query: Vec<(String, String)>,
    pub body: Option<JsonValue>,
}

impl ApiRequest {
    pub fn get<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            method: ApiMethod::Get,
            target: ApiTarget::Path(segments.into_iter().map(Into::into).collect()),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post<S: Into<String>>(segments: impl IntoIterator<Item = S>, body: JsonValue) -> Self {
        Self {
            method: ApiMethod::Post,
            target: ApiTarget::Path(segments.into_iter().map(Into::into).collect()),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// GET of a server-provided continuation URL.
    pub fn follow(url: impl Into<String>) -> Self {
        Self {
            method: ApiMethod::Get,
            target: ApiTarget::Absolute(url.into()),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        let method = match self.method {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
        };
        match &self.target {
            ApiTarget::Path(segments) => format!("{} /{}", method, segments.join("/")),
            ApiTarget::Absolute(_) => format!("{} <continuation>", method),
        }
    }
}
