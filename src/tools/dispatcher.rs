//! Tool dispatch.
//!
//! [`Dispatcher::dispatch`] is the single entry point from the MCP layer:
//! it validates arguments against the tool's [`ToolSchema`], builds a
//! [`QueryRequest`], runs it and normalizes the result. Every outcome,
//! including failures, is a [`ToolResponse`]. Nothing is cached; identical
//! calls run independently.

use crate::error::{ArgumentError, ErrorKind, ExecutionError};
use crate::models::{CloudProvider, QueryRequest, QueryShape, TimeRange, ToolResponse};
use crate::query::QueryExecutor;
use crate::tools::catalog::QueryCatalog;
use crate::tools::format::OutputFormat;
use crate::tools::normalize::{NormalizeOptions, normalize};
use crate::tools::schema::{
    LIST_ALERTS, LIST_RESOURCES, PING, RUN_LQL_QUERY, SEARCH_AWS_COMPLIANCE, ToolSchema,
    ValidatedArgs, builtin_schemas,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};

/// Fields returned by a compliance search unless the caller picks others.
pub const DEFAULT_COMPLIANCE_RETURNS: [&str; 5] =
    ["account", "id", "recommendation", "severity", "status"];

const RESOURCE_WINDOW_DAYS: i64 = 1;
const ALERT_WINDOW_DAYS: i64 = 7;
const COMPLIANCE_WINDOW_DAYS: i64 = 7;

/// Longest platform message echoed back in a `bad_query` error.
const MAX_ECHOED_MESSAGE: usize = 200;

pub struct Dispatcher {
    executor: Arc<QueryExecutor>,
    schemas: BTreeMap<&'static str, ToolSchema>,
    catalog: Arc<QueryCatalog>,
    normalize: NormalizeOptions,
}

impl Dispatcher {
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self {
            executor,
            schemas: builtin_schemas().into_iter().map(|s| (s.name, s)).collect(),
            catalog: Arc::new(QueryCatalog::default()),
            normalize: NormalizeOptions::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: QueryCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.normalize = options;
        self
    }

    pub fn tool_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.schemas.keys().copied()
    }

    pub fn schema(&self, tool: &str) -> Option<&ToolSchema> {
        self.schemas.get(tool)
    }

    /// Run one tool call.
    pub async fn dispatch(&self, tool: &str, arguments: Map<String, JsonValue>) -> ToolResponse {
        let call_id = uuid::Uuid::new_v4();
        let span = info_span!("tool_call", tool, %call_id);
        async {
            let response = self.dispatch_inner(tool, &arguments).await;
            match response.error_kind() {
                None => info!("Tool call succeeded"),
                Some(kind) => info!(%kind, "Tool call failed"),
            }
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch_inner(&self, tool: &str, arguments: &Map<String, JsonValue>) -> ToolResponse {
        let Some(schema) = self.schemas.get(tool) else {
            return invalid(ArgumentError::UnknownTool {
                name: tool.to_string(),
            });
        };
        let args = match schema.validate(arguments) {
            Ok(args) => args,
            Err(e) => return invalid(e),
        };

        if tool == PING {
            return self.ping().await;
        }

        let (request, format) = match self.build_request(tool, &args, Utc::now()) {
            Ok(built) => built,
            Err(e) => return invalid(e),
        };
        debug!(shape = request.shape().label(), "Executing request");

        match self.executor.execute(&request).await {
            Ok(result) => normalize(result, &self.normalize.with_format(format)),
            Err(e) => execution_error(&e),
        }
    }

    /// Verify the credentials by obtaining a token.
    async fn ping(&self) -> ToolResponse {
        match self.executor.tokens().get_valid_token().await {
            Ok(token) => ToolResponse::ok(json!({
                "authenticated": true,
                "expires_at": token.expires_at().to_rfc3339(),
            })),
            Err(e) => execution_error(&e.into()),
        }
    }

    fn build_request(
        &self,
        tool: &str,
        args: &ValidatedArgs,
        now: DateTime<Utc>,
    ) -> Result<(QueryRequest, OutputFormat), ArgumentError> {
        let format = args
            .string("format")
            .and_then(OutputFormat::parse)
            .unwrap_or_default();

        let request = match tool {
            RUN_LQL_QUERY => {
                let shape = match (args.string("queryName"), args.string("queryText")) {
                    (Some(id), None) => QueryShape::SavedQuery {
                        query_id: id.to_string(),
                    },
                    (None, Some(text)) => QueryShape::AdHocQuery {
                        query_text: text.to_string(),
                    },
                    _ => {
                        return Err(ArgumentError::invalid(
                            "provide exactly one of 'queryName' or 'queryText'",
                        ));
                    }
                };
                let window = time_range(args, now, None)?;
                let parameters = args.map("parameters");
                if let QueryShape::SavedQuery { query_id } = &shape {
                    self.catalog.check(query_id, &parameters, window.is_some())?;
                }
                let mut request = QueryRequest::new(shape);
                for (name, value) in parameters {
                    request = request.with_parameter(name, value);
                }
                with_window(request, window)
            }
            LIST_RESOURCES => {
                let provider = args
                    .string("provider")
                    .and_then(CloudProvider::parse)
                    .ok_or_else(|| {
                        ArgumentError::invalid("'provider' must be one of aws, azure, gcp")
                    })?;
                let request = QueryRequest::new(QueryShape::ResourceListing {
                    provider,
                    resource_type: args.string("resourceType").map(String::from),
                });
                with_window(request, time_range(args, now, Some(RESOURCE_WINDOW_DAYS))?)
            }
            LIST_ALERTS => with_window(
                QueryRequest::new(QueryShape::Alerts),
                time_range(args, now, Some(ALERT_WINDOW_DAYS))?,
            ),
            SEARCH_AWS_COMPLIANCE => {
                let mut returns = args.list("returns");
                if returns.is_empty() {
                    returns = DEFAULT_COMPLIANCE_RETURNS.map(String::from).to_vec();
                }
                let request = QueryRequest::new(QueryShape::ComplianceSearch {
                    statuses: args.list("status"),
                    account_ids: args.list("accountIds"),
                    returns,
                });
                with_window(request, time_range(args, now, Some(COMPLIANCE_WINDOW_DAYS))?)
            }
            other => {
                return Err(ArgumentError::UnknownTool {
                    name: other.to_string(),
                });
            }
        };

        let request = match args.integer("limit") {
            Some(limit) => request.with_limit(limit),
            None => request,
        };
        Ok((request, format))
    }
}

fn with_window(request: QueryRequest, window: Option<TimeRange>) -> QueryRequest {
    match window {
        Some(window) => request.with_time_range(window),
        None => request,
    }
}

/// Resolve `startTime`/`endTime`. A missing end means now; a missing start
/// means `default_days` before the end. With neither given the default
/// window applies, if the tool has one.
fn time_range(
    args: &ValidatedArgs,
    now: DateTime<Utc>,
    default_days: Option<i64>,
) -> Result<Option<TimeRange>, ArgumentError> {
    let start = args.timestamp("startTime");
    let end = args.timestamp("endTime");
    let span = Duration::days(default_days.unwrap_or(ALERT_WINDOW_DAYS));

    let (start, end) = match (start, end) {
        (None, None) => {
            return Ok(default_days.map(|days| TimeRange::ending_at(now, Duration::days(days))));
        }
        (Some(start), None) => (start, now),
        (None, Some(end)) => (end - span, end),
        (Some(start), Some(end)) => (start, end),
    };
    TimeRange::new(start, end)
        .map(Some)
        .ok_or_else(|| ArgumentError::invalid("'startTime' must be before 'endTime'"))
}

fn invalid(err: ArgumentError) -> ToolResponse {
    debug!(error = %err, "Rejected tool arguments");
    ToolResponse::invalid_arguments(err.to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Fold an executor failure into a stable, non-leaking error response.
fn execution_error(err: &ExecutionError) -> ToolResponse {
    warn!(error = %err, "Query execution failed");
    match err {
        ExecutionError::Auth { .. } => ToolResponse::error(
            ErrorKind::Auth,
            "Lacework rejected the API credentials",
        )
        .with_suggestion("Check LW_ACCOUNT, LW_KEY_ID, LW_SECRET and LW_SUBACCOUNT"),
        ExecutionError::Upstream { .. } => ToolResponse::error(
            ErrorKind::Upstream,
            "The Lacework API is unavailable or returned an unexpected response",
        )
        .with_suggestion("Retry later"),
        ExecutionError::BadQuery { status, message } => ToolResponse::error(
            ErrorKind::BadQuery,
            format!(
                "Lacework rejected the request (HTTP {}): {}",
                status,
                truncate_chars(message, MAX_ECHOED_MESSAGE)
            ),
        )
        .with_suggestion("Check the query name, LQL text and parameters"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, AuthError};
    use crate::lacework::{ApiRequest, ApiTransport, AuthExchange, TokenGrant};
    use crate::models::{ApiPayload, Credentials, Token};
    use crate::session::TokenManager;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedExchange {
        fail: bool,
    }

    #[async_trait]
    impl AuthExchange for FixedExchange {
        async fn exchange(&self, _credentials: &Credentials) -> Result<TokenGrant, AuthError> {
            if self.fail {
                return Err(AuthError::rejected(401, "invalid key"));
            }
            Ok(TokenGrant {
                token: "secret-bearer-value".to_string(),
                issued_at: Utc::now(),
                server_ttl: None,
            })
        }
    }

    /// Answers every request with the same outcome and records requests.
    struct FixedTransport {
        outcome: Result<JsonValue, ApiError>,
        calls: AtomicUsize,
        sent: Mutex<Vec<ApiRequest>>,
    }

    #[async_trait]
    impl ApiTransport for FixedTransport {
        async fn send(&self, request: &ApiRequest, _token: &Token) -> Result<ApiPayload, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push(request.clone());
            self.outcome.clone().map(ApiPayload::from_value)
        }
    }

    fn dispatcher_with(
        outcome: Result<JsonValue, ApiError>,
        fail_auth: bool,
    ) -> (Dispatcher, Arc<FixedTransport>) {
        let credentials = Arc::new(Credentials::new("demo", "key", "secret", None, 3600).unwrap());
        let tokens = Arc::new(TokenManager::new(
            credentials,
            Arc::new(FixedExchange { fail: fail_auth }),
        ));
        let transport = Arc::new(FixedTransport {
            outcome,
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        });
        let executor = Arc::new(QueryExecutor::new(tokens, transport.clone()));
        (Dispatcher::new(executor), transport)
    }

    fn dispatcher() -> (Dispatcher, Arc<FixedTransport>) {
        dispatcher_with(Ok(json!({"data": [{"resourceId": "i-1"}]})), false)
    }

    fn args(v: JsonValue) -> Map<String, JsonValue> {
        v.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (d, transport) = dispatcher();
        let response = d.dispatch("drop_tables", Map::new()).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::InvalidArguments));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_network() {
        let (d, transport) = dispatcher();
        let cases = [
            (LIST_RESOURCES, json!({})),
            (LIST_RESOURCES, json!({"provider": "oracle"})),
            (LIST_RESOURCES, json!({"provider": "aws", "extra": 1})),
            (RUN_LQL_QUERY, json!({})),
            (RUN_LQL_QUERY, json!({"queryName": "a", "queryText": "b"})),
            (LIST_ALERTS, json!({"startTime": "2025-02-01", "endTime": "2025-01-01"})),
            (SEARCH_AWS_COMPLIANCE, json!({"status": [1, 2]})),
        ];
        for (tool, arguments) in cases {
            let response = d.dispatch(tool, args(arguments.clone())).await;
            assert_eq!(
                response.error_kind(),
                Some(ErrorKind::InvalidArguments),
                "{} {}",
                tool,
                arguments
            );
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(d.executor.tokens().exchange_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_reported_as_invalid_not_missing() {
        let (d, _) = dispatcher();
        for provider in ["google", "oracle"] {
            let response = d
                .dispatch(LIST_RESOURCES, args(json!({"provider": provider})))
                .await;
            let error = response.error.unwrap();
            assert_eq!(error.kind, ErrorKind::InvalidArguments);
            assert!(error.message.contains("provider"), "{}", error.message);
            assert!(!error.message.contains("Missing"), "{}", error.message);
        }
    }

    #[tokio::test]
    async fn test_identical_calls_are_not_cached() {
        let (d, transport) = dispatcher();
        let first = d.dispatch(LIST_RESOURCES, args(json!({"provider": "aws"}))).await;
        let second = d.dispatch(LIST_RESOURCES, args(json!({"provider": "aws"}))).await;
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.payload.unwrap()["rows"][0]["resourceId"], "i-1");
    }

    #[tokio::test]
    async fn test_catalog_required_parameters() {
        let (d, transport) = dispatcher();
        let catalog = QueryCatalog::from_json(
            r#"{"queries": {"samv_out_of_canada": {"requiredParameters": ["Region"]}}}"#,
        )
        .unwrap();
        let d = d.with_catalog(catalog);

        let response = d
            .dispatch(RUN_LQL_QUERY, args(json!({"queryName": "samv_out_of_canada"})))
            .await;
        assert_eq!(response.error_kind(), Some(ErrorKind::InvalidArguments));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

        let response = d
            .dispatch(
                RUN_LQL_QUERY,
                args(json!({
                    "queryName": "samv_out_of_canada",
                    "parameters": {"Region": "ca-central-1"},
                    "startTime": "2025-01-01",
                    "endTime": "2025-01-02"
                })),
            )
            .await;
        assert!(response.is_ok());
        let sent = transport.sent.lock().unwrap().clone();
        let body = sent[0].body.clone().unwrap();
        assert_eq!(body["arguments"][0], json!({"name": "Region", "value": "ca-central-1"}));
        assert_eq!(body["arguments"][1]["value"], "2025-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_compliance_defaults() {
        let (d, transport) = dispatcher();
        let response = d
            .dispatch(SEARCH_AWS_COMPLIANCE, args(json!({"status": "NonCompliant"})))
            .await;
        assert!(response.is_ok());
        let sent = transport.sent.lock().unwrap().clone();
        let body = sent[0].body.clone().unwrap();
        assert_eq!(body["returns"], json!(DEFAULT_COMPLIANCE_RETURNS));
        assert_eq!(body["filters"][0]["value"], "NonCompliant");
    }

    #[tokio::test]
    async fn test_bad_query_message_is_bounded() {
        let long = "x".repeat(1000);
        let (d, _) = dispatcher_with(Err(ApiError::invalid_request(400, long)), false);
        let response = d
            .dispatch(RUN_LQL_QUERY, args(json!({"queryText": "{ bogus }"})))
            .await;
        let detail = response.error.unwrap();
        assert_eq!(detail.kind, ErrorKind::BadQuery);
        assert!(detail.message.starts_with("Lacework rejected the request (HTTP 400)"));
        assert!(detail.message.len() < 300);
        assert!(detail.suggestion.is_some());
    }

    #[tokio::test]
    async fn test_errors_never_contain_token() {
        let (d, _) = dispatcher_with(
            Err(ApiError::transient(Some(503), 3, "Service Unavailable")),
            false,
        );
        let response = d.dispatch(LIST_ALERTS, Map::new()).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::Upstream));
        let text = serde_json::to_string(&response).unwrap();
        assert!(!text.contains("secret-bearer-value"));
    }

    #[tokio::test]
    async fn test_ping() {
        let (d, transport) = dispatcher();
        let response = d.dispatch(PING, Map::new()).await;
        let payload = response.payload.unwrap();
        assert_eq!(payload["authenticated"], true);
        assert!(payload.get("token").is_none());
        assert!(payload["expires_at"].is_string());
        assert!(!serde_json::to_string(&payload).unwrap().contains("secret"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

        let (d, _) = dispatcher_with(Ok(json!({"data": []})), true);
        let response = d.dispatch(PING, Map::new()).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::Auth));
    }

    #[tokio::test]
    async fn test_table_format() {
        let (d, _) = dispatcher();
        let response = d
            .dispatch(LIST_RESOURCES, args(json!({"provider": "gcp", "format": "table"})))
            .await;
        let payload = response.payload.unwrap();
        assert!(payload["formatted"].as_str().unwrap().contains("resourceId"));
    }
}
