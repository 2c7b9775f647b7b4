//! The tool result envelope returned to MCP clients.

use crate::error::ErrorKind;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Outcome of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Structured error detail. Never contains tokens, secrets or raw upstream bodies.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ToolErrorDetail {
    /// Stable error category
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
    /// What the caller can do about it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// The only type that crosses back to the MCP transport.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ToolResponse {
    /// "ok" or "error"
    pub status: ToolStatus,
    /// Result data when status is "ok"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    /// Error detail when status is "error"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorDetail>,
}

impl ToolResponse {
    pub fn ok(payload: JsonValue) -> Self {
        Self {
            status: ToolStatus::Ok,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            payload: None,
            error: Some(ToolErrorDetail {
                kind,
                message: message.into(),
                suggestion: None,
            }),
        }
    }

    /// Attach a suggestion to an error response. No-op on success.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        if let Some(detail) = self.error.as_mut() {
            detail.suggestion = Some(suggestion.into());
        }
        self
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::InvalidArguments, message)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
