//! Shapes of JSON bodies returned by the Lacework API.
//!
//! Upstream payloads vary per endpoint. Instead of poking at arbitrary
//! fields, bodies are decoded into [`ApiPayload`], a union of the shapes we
//! understand with an explicit fallback for everything else.

use crate::models::query::{Cursor, QueryResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// A decoded API response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiPayload {
    /// `{"data": [...], "paging": {...}}`: query results and listings.
    Page(PageBody),
    /// `{"message": "..."}`: platform error description.
    Error(ErrorBody),
    /// Anything else.
    Unrecognized(JsonValue),
}

impl ApiPayload {
    /// Decode a body, never failing: unknown shapes become `Unrecognized`.
    pub fn from_value(value: JsonValue) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(Self::Unrecognized(value))
    }

    /// Decode raw response text. Non-JSON text is kept as a JSON string.
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<JsonValue>(text) {
            Ok(value) => Self::from_value(value),
            Err(_) => Self::Unrecognized(JsonValue::String(text.to_string())),
        }
    }

    /// Human-readable message of an error body, if any.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(body) => Some(body.message.as_str()),
            _ => None,
        }
    }
}

/// One page of rows.
#[derive(Debug, Clone, Deserialize)]
pub struct PageBody {
    pub data: Vec<JsonValue>,
    #[serde(default)]
    pub paging: Option<Paging>,
    /// Explicit "more rows exist" marker some endpoints send.
    #[serde(default)]
    pub truncated: Option<bool>,
}

impl PageBody {
    /// Continuation cursor, if the server says more rows exist.
    pub fn next_cursor(&self) -> Option<Cursor> {
        if self.truncated == Some(false) {
            return None;
        }
        self.paging.as_ref().and_then(Paging::cursor)
    }

    /// Convert into a single-page [`QueryResult`].
    pub fn into_result(self) -> QueryResult {
        let cursor = self.next_cursor();
        QueryResult {
            truncated: cursor.is_some(),
            cursor,
            rows: self.data,
            pages: 1,
        }
    }
}

/// Paging block. Endpoints disagree on the field name of the continuation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub next_token: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub urls: Option<PagingUrls>,
    #[serde(default)]
    pub rows: Option<u64>,
    #[serde(default)]
    pub total_rows: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingUrls {
    #[serde(default)]
    pub next_page: Option<String>,
}

impl Paging {
    pub fn cursor(&self) -> Option<Cursor> {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        if let Some(url) = self.urls.as_ref().and_then(|u| non_empty(&u.next_page)) {
            return Some(Cursor::NextPage(url));
        }
        if let Some(next) = non_empty(&self.next_page) {
            return Some(if next.starts_with("http://") || next.starts_with("https://") {
                Cursor::NextPage(next)
            } else {
                Cursor::Token(next)
            });
        }
        non_empty(&self.next_token)
            .or_else(|| non_empty(&self.cursor))
            .map(Cursor::Token)
    }
}

/// Platform error description.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(alias = "error", alias = "errorMessage")]
    pub message: String,
}

/// Body of `POST /access/tokens`. The token may be wrapped in `data`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AuthPayload {
    Wrapped { data: AuthBody },
    Bare(AuthBody),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthBody {
    pub token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthPayload {
    fn body(&self) -> &AuthBody {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(body) => body,
        }
    }

    pub fn token(&self) -> &str {
        &self.body().token
    }

    /// Lifetime announced by the server relative to `now`, if any.
    pub fn server_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        let body = self.body();
        if let Some(secs) = body.expires_in {
            return Some(Duration::from_secs(secs));
        }
        body.expires_at
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_with_token_cursor() {
        let payload = ApiPayload::from_value(json!({
            "data": [{"a": 1}],
            "paging": {"nextToken": "c1"}
        }));
        let ApiPayload::Page(page) = payload else {
            panic!("expected page");
        };
        assert_eq!(page.next_cursor(), Some(Cursor::Token("c1".into())));
        let result = page.into_result();
        assert!(result.truncated);
        assert_eq!(result.row_count(), 1);
    }

    #[test]
    fn test_page_with_next_page_url() {
        let payload = ApiPayload::from_value(json!({
            "data": [],
            "paging": {"rows": 0, "totalRows": 10, "urls": {"nextPage": "https://x.lacework.net/api/v2/Inventory/abc"}}
        }));
        let ApiPayload::Page(page) = payload else {
            panic!("expected page");
        };
        assert_eq!(
            page.next_cursor(),
            Some(Cursor::NextPage("https://x.lacework.net/api/v2/Inventory/abc".into()))
        );
    }

    #[test]
    fn test_explicit_no_more_marker_wins() {
        let payload = ApiPayload::from_value(json!({
            "data": [1, 2],
            "truncated": false,
            "paging": {"cursor": "ignored"}
        }));
        let ApiPayload::Page(page) = payload else {
            panic!("expected page");
        };
        assert!(page.next_cursor().is_none());
    }

    #[test]
    fn test_blank_cursor_is_no_cursor() {
        let paging = Paging {
            next_page: Some("  ".into()),
            ..Paging::default()
        };
        assert!(paging.cursor().is_none());
    }

    #[test]
    fn test_error_and_fallback_shapes() {
        let err = ApiPayload::from_text(r#"{"message": "Query not found"}"#);
        assert_eq!(err.error_message(), Some("Query not found"));

        let other = ApiPayload::from_value(json!({"data": {"not": "a list"}}));
        assert!(matches!(other, ApiPayload::Unrecognized(_)));

        let html = ApiPayload::from_text("<html>bad gateway</html>");
        assert!(matches!(html, ApiPayload::Unrecognized(JsonValue::String(_))));
    }

    #[test]
    fn test_auth_payload_shapes() {
        let wrapped: AuthPayload =
            serde_json::from_value(json!({"data": {"token": "t1", "expiresIn": 120}})).unwrap();
        assert_eq!(wrapped.token(), "t1");
        assert_eq!(wrapped.server_ttl(Utc::now()), Some(Duration::from_secs(120)));

        let now = Utc::now();
        let bare: AuthPayload = serde_json::from_value(json!({
            "token": "t2",
            "expiresAt": (now + chrono::Duration::seconds(600)).to_rfc3339()
        }))
        .unwrap();
        assert_eq!(bare.token(), "t2");
        let ttl = bare.server_ttl(now).unwrap();
        assert!(ttl.as_secs() >= 599 && ttl.as_secs() <= 600);

        let no_ttl: AuthPayload = serde_json::from_value(json!({"token": "t3"})).unwrap();
        assert!(no_ttl.server_ttl(now).is_none());
    }
}
