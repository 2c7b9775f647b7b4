//! Error types for the Lacework MCP Server.
//!
//! Each layer of the pipeline owns one `thiserror` enum:
//!
//! - [`AuthError`]: the credential-for-token exchange failed
//! - [`ApiError`]: a single API call failed after the client's retry policy
//! - [`ExecutionError`]: a query could not be completed by the executor
//! - [`ArgumentError`]: tool-call arguments do not match the tool's schema
//! - [`ConfigError`]: startup configuration is incomplete or invalid
//! - [`ServerError`]: transport/bootstrap failures
//!
//! None of these ever reach the MCP client directly; the dispatcher folds
//! them into a [`ToolResponse`](crate::models::ToolResponse) with a stable
//! [`ErrorKind`].

use schemars::JsonSchema;
use serde::Serialize;
use thiserror::Error;

/// Failure while exchanging credentials for a bearer token.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Authentication rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Authentication request failed: {message}")]
    Transport { message: String },

    #[error("Authentication response did not contain a token")]
    MissingToken,

    #[error("Token refresh task failed: {message}")]
    Aborted { message: String },
}

impl AuthError {
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            body: body.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// HTTP status of the auth endpoint, when it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Classification of an [`ApiError`], used by the executor's policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Unauthorized,
    Transient,
    InvalidRequest,
    Decode,
}

/// Failure of a single authenticated API call.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// 401 from the platform. Never retried by the client.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// 429, 5xx, timeout or connection failure, after all retry attempts.
    #[error("Transient upstream failure after {attempts} attempt(s): {message}")]
    Transient {
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    /// Any other 4xx. The request itself is malformed.
    #[error("Invalid request (HTTP {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    /// 2xx with a body that is not JSON, or a continuation we refuse to follow.
    #[error("Unexpected response: {message}")]
    Decode { message: String },
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn transient(status: Option<u16>, attempts: u32, message: impl Into<String>) -> Self {
        Self::Transient {
            status,
            attempts,
            message: message.into(),
        }
    }

    pub fn invalid_request(status: u16, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            status,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Unauthorized { .. } => ApiErrorKind::Unauthorized,
            Self::Transient { .. } => ApiErrorKind::Transient,
            Self::InvalidRequest { .. } => ApiErrorKind::InvalidRequest,
            Self::Decode { .. } => ApiErrorKind::Decode,
        }
    }

    /// Check if this error is retryable by the client's backoff loop.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ApiErrorKind::Transient
    }
}

/// Failure surfaced by the query executor after its retry policy ran.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("Authorization failed: {message}")]
    Auth { message: String },

    #[error("Upstream failure: {message}")]
    Upstream { message: String },

    #[error("Query rejected (HTTP {status}): {message}")]
    BadQuery { status: u16, message: String },
}

impl ExecutionError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn bad_query(status: u16, message: impl Into<String>) -> Self {
        Self::BadQuery {
            status,
            message: message.into(),
        }
    }

    /// Stable error kind reported to the MCP client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::BadQuery { .. } => ErrorKind::BadQuery,
        }
    }
}

impl From<AuthError> for ExecutionError {
    fn from(err: AuthError) -> Self {
        Self::auth(err.to_string())
    }
}

/// Executor view of a failed call. `Unauthorized` reaching this conversion
/// means the one forced refresh was already spent.
impl From<ApiError> for ExecutionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized { message } => Self::auth(message),
            ApiError::Transient { .. } | ApiError::Decode { .. } => Self::upstream(err.to_string()),
            ApiError::InvalidRequest { status, message } => Self::bad_query(status, message),
        }
    }
}

/// Stable error kinds carried by an error [`ToolResponse`](crate::models::ToolResponse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArguments,
    Auth,
    Upstream,
    BadQuery,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidArguments => "invalid_arguments",
            Self::Auth => "auth",
            Self::Upstream => "upstream",
            Self::BadQuery => "bad_query",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Tool-call arguments rejected before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Unknown argument '{name}'")]
    UnknownArgument { name: String },

    #[error("Missing required argument '{name}'")]
    Missing { name: String },

    #[error("Argument '{name}' must be {expected}")]
    WrongType { name: String, expected: &'static str },

    #[error("Argument '{name}' must not be blank")]
    Blank { name: String },

    #[error("Argument '{name}' is not a valid timestamp (expected YYYY-MM-DDTHH:MM:SSZ or YYYY-MM-DD)")]
    BadTimestamp { name: String },

    #[error("Invalid arguments: {message}")]
    Invalid { message: String },
}

impl ArgumentError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Startup configuration problems. Any of these prevents the server from serving.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {name} (set {env} or pass --{flag})")]
    Missing {
        name: &'static str,
        env: &'static str,
        flag: &'static str,
    },

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Transport and bootstrap failures of the server process itself.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Failed to bind to {addr}: {message}")]
    Bind { addr: String, message: String },
}

impl ServerError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Result type alias for server-level operations.
pub type ServerResult<T> = Result<T, ServerError>;
