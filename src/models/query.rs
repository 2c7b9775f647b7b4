//! Query-related data models.
//!
//! This module defines the request a tool call is turned into and the
//! paginated result the executor assembles from it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Cloud providers known to the Lacework inventory API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
}

impl CloudProvider {
    /// Parse a provider name case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Some(Self::Aws),
            "azure" => Some(Self::Azure),
            "gcp" => Some(Self::Gcp),
            _ => None,
        }
    }

    /// Value of the `csp` field in inventory searches.
    pub fn csp(&self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::Azure => "Azure",
            Self::Gcp => "GCP",
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.csp())
    }
}

/// Inclusive-exclusive UTC time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Returns `None` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Window of `duration` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, duration: chrono::Duration) -> Self {
        Self {
            start: end - duration,
            end,
        }
    }

    /// Split into consecutive windows no longer than `max`, in time order.
    pub fn slices(&self, max: chrono::Duration) -> Vec<TimeRange> {
        let mut out = Vec::new();
        let mut start = self.start;
        while start < self.end {
            let end = (start + max).min(self.end);
            out.push(TimeRange { start, end });
            start = end;
        }
        out
    }
}

/// The kind of upstream call a request maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryShape {
    /// Saved LQL query, executed by id.
    SavedQuery { query_id: String },
    /// Ad-hoc LQL text.
    AdHocQuery { query_text: String },
    /// Inventory listing filtered by provider and optional resource type.
    ResourceListing {
        provider: CloudProvider,
        resource_type: Option<String>,
    },
    /// Alert listing over a time window.
    Alerts,
    /// AWS compliance evaluation search.
    ComplianceSearch {
        statuses: Vec<String>,
        account_ids: Vec<String>,
        returns: Vec<String>,
    },
}

impl QueryShape {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SavedQuery { .. } => "saved_query",
            Self::AdHocQuery { .. } => "adhoc_query",
            Self::ResourceListing { .. } => "resource_listing",
            Self::Alerts => "alerts",
            Self::ComplianceSearch { .. } => "compliance_search",
        }
    }
}

/// A fully validated request. Immutable once built; retries reuse it as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    shape: QueryShape,
    parameters: BTreeMap<String, String>,
    time_range: Option<TimeRange>,
    limit: Option<usize>,
}

impl QueryRequest {
    /// Create a new request with no parameters, window or limit.
    pub fn new(shape: QueryShape) -> Self {
        Self {
            shape,
            parameters: BTreeMap::new(),
            time_range: None,
            limit: None,
        }
    }

    /// Bind an LQL parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Set the time window.
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Cap the number of aggregated rows.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// Continuation token returned by a paginated endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Opaque token echoed back in the request body's `paging.cursor`.
    Token(String),
    /// Absolute URL of the next page, fetched with GET.
    NextPage(String),
}

/// Rows of one page, or of all pages once aggregated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<JsonValue>,
    pub cursor: Option<Cursor>,
    pub truncated: bool,
    /// Number of upstream pages fetched.
    pub pages: usize,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Append another page's rows after the current ones.
    pub fn absorb(&mut self, page: QueryResult) {
        self.rows.extend(page.rows);
        self.pages += page.pages.max(1);
        self.cursor = page.cursor;
    }
}
