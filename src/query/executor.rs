//! Query execution: authentication, pagination and error mapping.

use crate::error::{ApiError, ExecutionError};
use crate::lacework::{ApiRequest, ApiTransport};
use crate::models::{ApiPayload, QueryRequest, QueryResult, TimeRange};
use crate::query::builder;
use crate::session::TokenManager;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

/// Default cap on upstream pages fetched for one request.
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Runs [`QueryRequest`]s against the platform.
pub struct QueryExecutor {
    tokens: Arc<TokenManager>,
    transport: Arc<dyn ApiTransport>,
    max_pages: usize,
}

impl QueryExecutor {
    pub fn new(tokens: Arc<TokenManager>, transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            tokens,
            transport,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Cap the number of pages fetched per request. Zero is treated as one.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Execute a request, following pagination until the cursor runs out,
    /// the row limit is reached or the page cap is hit.
    ///
    /// Rows are returned in page order. `truncated` is set whenever rows were
    /// left behind.
    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryResult, ExecutionError> {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("execute", %request_id, shape = request.shape().label());
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(&self, request: &QueryRequest) -> Result<QueryResult, ExecutionError> {
        let started = Instant::now();
        let now = Utc::now();
        let windows = builder::windows(request, now);
        let limit = request.limit();

        let mut aggregate = QueryResult::default();
        for (index, window) in windows.iter().enumerate() {
            let remaining = limit.map(|l| l.saturating_sub(aggregate.row_count()));
            if remaining == Some(0) || aggregate.pages >= self.max_pages {
                // Later windows were never fetched.
                aggregate.truncated = true;
                break;
            }
            if windows.len() > 1 {
                debug!(window = index + 1, of = windows.len(), "Searching time slice");
            }

            let part = self
                .run_window(request, *window, remaining, self.max_pages - aggregate.pages)
                .await?;
            let part_truncated = part.truncated;
            aggregate.absorb(part);
            aggregate.truncated |= part_truncated;
        }

        if let Some(limit) = limit {
            if aggregate.rows.len() > limit {
                aggregate.rows.truncate(limit);
                aggregate.truncated = true;
            }
        }

        info!(
            rows = aggregate.row_count(),
            pages = aggregate.pages,
            truncated = aggregate.truncated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query completed"
        );
        Ok(aggregate)
    }

    /// Fetch every page of one time window, at most `page_budget` of them.
    async fn run_window(
        &self,
        request: &QueryRequest,
        window: Option<TimeRange>,
        remaining: Option<usize>,
        page_budget: usize,
    ) -> Result<QueryResult, ExecutionError> {
        let first = builder::first_page(request, window, remaining, Utc::now());
        let mut result = QueryResult::default();
        let mut next = Some(first.clone());

        while let Some(page_request) = next.take() {
            if result.pages >= page_budget {
                warn!(pages = result.pages, "Page cap reached, returning partial results");
                result.truncated = true;
                break;
            }

            let page = self.fetch_page(&page_request).await?;
            debug!(page = result.pages + 1, rows = page.row_count(), "Fetched page");
            result.absorb(page);

            let Some(cursor) = result.cursor.clone() else {
                break;
            };
            if remaining.is_some_and(|r| result.row_count() >= r) {
                result.truncated = true;
                break;
            }
            let still_wanted = remaining.map(|r| r - result.row_count());
            next = Some(builder::next_page(&first, &cursor, still_wanted));
        }

        result.cursor = None;
        Ok(result)
    }

    /// Fetch one page. A 401 triggers a single forced refresh and one resend
    /// of the identical request.
    async fn fetch_page(&self, request: &ApiRequest) -> Result<QueryResult, ExecutionError> {
        let token = self.tokens.get_valid_token().await?;
        let payload = match self.transport.send(request, &token).await {
            Err(ApiError::Unauthorized { .. }) => {
                warn!(request = %request.describe(), "Token rejected, refreshing once");
                let fresh = self.tokens.force_refresh(&token).await?;
                self.transport.send(request, &fresh).await?
            }
            other => other?,
        };

        match payload {
            ApiPayload::Page(page) => Ok(page.into_result()),
            ApiPayload::Error(body) => {
                debug!(message = %body.message, "Error body on a successful status");
                Err(ExecutionError::upstream("platform returned an error body"))
            }
            ApiPayload::Unrecognized(_) => {
                Err(ExecutionError::upstream("unrecognized response shape"))
            }
        }
    }
}
