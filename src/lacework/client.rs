//! `reqwest`-based Lacework API client.
//!
//! One [`reqwest::Client`] is built at startup and shared by every call, so
//! connections are reused. The client itself is stateless between calls.

use crate::error::{ApiError, AuthError, ConfigError};
use crate::lacework::{
    ApiMethod, ApiRequest, ApiTarget, ApiTransport, AuthExchange, RetryPolicy, TokenGrant,
};
use crate::models::{ApiPayload, AuthPayload, Credentials, Token};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use secrecy::ExposeSecret;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Header carrying the sub-account name.
pub const SUBACCOUNT_HEADER: &str = "X-LW-Sub-Account";

/// Header carrying the API secret during the token exchange.
const SECRET_HEADER: &str = "X-LW-UAKS";

/// User agent for API requests
const USER_AGENT: &str = concat!("lacework-mcp-server/", env!("CARGO_PKG_VERSION"));

/// Longest upstream body excerpt kept in error messages.
const MAX_BODY_EXCERPT: usize = 200;

/// Transport settings for [`LaceworkClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// API root. Defaults to `https://{account}.lacework.net/api/v2`.
    pub base_url: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Extra PEM root certificate (corporate TLS inspection).
    pub ca_bundle: Option<PathBuf>,
    /// Honor `HTTP(S)_PROXY` environment variables.
    pub trust_env: bool,
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            ca_bundle: None,
            trust_env: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Client for the Lacework v2 API.
pub struct LaceworkClient {
    http: Client,
    base_url: Url,
    subaccount: Option<String>,
    retry: RetryPolicy,
}

impl LaceworkClient {
    /// Build a client for the tenant named in `credentials`.
    pub fn new(credentials: &Credentials, settings: ClientSettings) -> Result<Self, ConfigError> {
        let raw_base = settings
            .base_url
            .clone()
            .unwrap_or_else(|| credentials.default_base_url());
        let base_url = Url::parse(raw_base.trim_end_matches('/'))
            .map_err(|e| ConfigError::invalid("base_url", e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::invalid("base_url", "URL cannot be used as a base"));
        }

        let mut builder = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .user_agent(USER_AGENT);
        if !settings.trust_env {
            builder = builder.no_proxy();
        }
        if let Some(path) = &settings.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| {
                ConfigError::invalid("ca_bundle", format!("{}: {}", path.display(), e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| ConfigError::invalid("ca_bundle", e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| ConfigError::invalid("http_client", e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            subaccount: credentials.subaccount().map(String::from),
            retry: settings.retry,
        })
    }

    /// Get the configured API root.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request target to a URL on the configured origin.
    pub fn resolve(&self, target: &ApiTarget) -> Result<Url, ApiError> {
        match target {
            ApiTarget::Path(segments) => {
                let mut url = self.base_url.clone();
                url.path_segments_mut()
                    .map_err(|_| ApiError::decode("API root cannot hold a path"))?
                    .pop_if_empty()
                    .extend(segments);
                Ok(url)
            }
            ApiTarget::Absolute(raw) => {
                let url = Url::parse(raw)
                    .map_err(|e| ApiError::decode(format!("Invalid continuation URL: {}", e)))?;
                if url.origin() != self.base_url.origin() {
                    return Err(ApiError::decode(
                        "Continuation URL points outside the configured API origin",
                    ));
                }
                Ok(url)
            }
        }
    }

    async fn send_once(
        &self,
        url: &Url,
        request: &ApiRequest,
        token: &Token,
    ) -> Result<ApiPayload, ApiError> {
        let method = match request.method {
            ApiMethod::Get => Method::GET,
            ApiMethod::Post => Method::POST,
        };
        let mut builder = self
            .http
            .request(method, url.clone())
            .bearer_auth(token.expose())
            .header(ACCEPT, "application/json");
        if let Some(sub) = &self.subaccount {
            builder = builder.header(SUBACCOUNT_HEADER, sub);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let text = response.text().await.map_err(network_error)?;
        classify_response(status, &text)
    }
}

/// Map a non-HTTP failure (timeout, connect, broken body) to a transient error.
fn network_error(err: reqwest::Error) -> ApiError {
    let what = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    ApiError::transient(None, 1, format!("{}: {}", what, err.without_url()))
}

/// Turn a status/body pair into a payload or a classified error.
pub(crate) fn classify_response(status: StatusCode, text: &str) -> Result<ApiPayload, ApiError> {
    let payload = ApiPayload::from_text(text);
    if status.is_success() {
        return Ok(payload);
    }

    debug!(status = status.as_u16(), body = %excerpt(text), "API call failed");
    let message = payload
        .error_message()
        .map(excerpt)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });

    match status.as_u16() {
        401 => Err(ApiError::unauthorized(message)),
        429 | 500..=599 => Err(ApiError::transient(Some(status.as_u16()), 1, message)),
        code => Err(ApiError::invalid_request(code, message)),
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= MAX_BODY_EXCERPT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_BODY_EXCERPT).collect();
        format!("{}...", cut)
    }
}

#[async_trait]
impl ApiTransport for LaceworkClient {
    async fn send(&self, request: &ApiRequest, token: &Token) -> Result<ApiPayload, ApiError> {
        let url = self.resolve(&request.target)?;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            // Backoff can outlive the token; hand back to the caller to refresh.
            if !token.is_usable_at(Utc::now(), Duration::ZERO) {
                debug!(request = %request.describe(), attempt, "Token expired before sending");
                return Err(ApiError::unauthorized("bearer token expired"));
            }
            match self.send_once(&url, request, token).await {
                Ok(payload) => return Ok(payload),
                Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        request = %request.describe(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient API failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(ApiError::Transient {
                    status, message, ..
                }) => return Err(ApiError::transient(status, attempt, message)),
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl AuthExchange for LaceworkClient {
    async fn exchange(&self, credentials: &Credentials) -> Result<TokenGrant, AuthError> {
        let url = self
            .resolve(&ApiTarget::Path(vec!["access".into(), "tokens".into()]))
            .map_err(|e| AuthError::transport(e.to_string()))?;
        let issued_at = Utc::now();

        let mut builder = self
            .http
            .post(url)
            .header(SECRET_HEADER, credentials.secret().expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .json(&json!({
                "keyId": credentials.key_id(),
                "expiryTime": credentials.expiry().as_secs(),
            }));
        if let Some(sub) = credentials.subaccount() {
            builder = builder.header(SUBACCOUNT_HEADER, sub);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AuthError::transport(e.without_url().to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::transport(e.without_url().to_string()))?;

        if !matches!(status, StatusCode::OK | StatusCode::CREATED) {
            return Err(AuthError::rejected(status.as_u16(), excerpt(&text)));
        }

        let payload: AuthPayload =
            serde_json::from_str(&text).map_err(|_| AuthError::MissingToken)?;
        if payload.token().trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        Ok(TokenGrant {
            token: payload.token().to_string(),
            issued_at,
            server_ttl: payload.server_ttl(issued_at),
        })
    }
}
