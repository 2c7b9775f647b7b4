//! Translation of a [`QueryRequest`] into Lacework API calls.
//!
//! | Shape | Call |
//! |---|---|
//! | saved query | `POST /Queries/{id}/execute` |
//! | ad-hoc query | `POST /Queries/execute` |
//! | resource listing | `POST /Inventory/search` |
//! | alerts | `GET /Alerts` |
//! | compliance search | `POST /Configs/ComplianceEvaluations/search` |

use crate::lacework::ApiRequest;
use crate::models::{Cursor, QueryRequest, QueryShape, TimeRange};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue, json};

/// LQL argument names carrying the time window.
pub const START_TIME_ARG: &str = "StartTimeRange";
pub const END_TIME_ARG: &str = "EndTimeRange";

/// Longest time slice the compliance search endpoint accepts.
pub const COMPLIANCE_SLICE_DAYS: i64 = 7;

/// Largest page the compliance search endpoint returns.
pub const MAX_COMPLIANCE_PAGE_SIZE: usize = 5000;

/// Window used when a request carries none.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Format a timestamp the way the Lacework API expects it.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn time_filter(window: TimeRange) -> JsonValue {
    json!({
        "startTime": format_timestamp(window.start),
        "endTime": format_timestamp(window.end),
    })
}

/// `eq` for one value, `in` for several.
fn field_filter(field: &str, values: &[String]) -> Option<JsonValue> {
    match values {
        [] => None,
        [one] => Some(json!({"field": field, "expression": "eq", "value": one})),
        many => Some(json!({"field": field, "expression": "in", "values": many})),
    }
}

/// LQL `arguments` array. The time window overrides same-named parameters.
fn lql_arguments(request: &QueryRequest) -> JsonValue {
    let window = request.time_range();
    let mut arguments: Vec<JsonValue> = request
        .parameters()
        .iter()
        .filter(|(name, _)| {
            window.is_none() || (name.as_str() != START_TIME_ARG && name.as_str() != END_TIME_ARG)
        })
        .map(|(name, value)| json!({"name": name, "value": value}))
        .collect();
    if let Some(window) = window {
        arguments.push(json!({"name": START_TIME_ARG, "value": format_timestamp(window.start)}));
        arguments.push(json!({"name": END_TIME_ARG, "value": format_timestamp(window.end)}));
    }
    JsonValue::Array(arguments)
}

/// Time windows the request is executed over, in order.
///
/// Compliance searches are split into slices the endpoint accepts; every
/// other shape runs over its single window (or none).
pub fn windows(request: &QueryRequest, now: DateTime<Utc>) -> Vec<Option<TimeRange>> {
    match request.shape() {
        QueryShape::ComplianceSearch { .. } => {
            let range = request.time_range().unwrap_or_else(|| {
                TimeRange::ending_at(now, chrono::Duration::days(DEFAULT_WINDOW_DAYS))
            });
            range
                .slices(chrono::Duration::days(COMPLIANCE_SLICE_DAYS))
                .into_iter()
                .map(Some)
                .collect()
        }
        _ => vec![request.time_range()],
    }
}

/// First page request for `request` over `window`.
///
/// `remaining` is the number of rows still wanted, used as a page-size hint
/// where the endpoint supports one.
pub fn first_page(
    request: &QueryRequest,
    window: Option<TimeRange>,
    remaining: Option<usize>,
    now: DateTime<Utc>,
) -> ApiRequest {
    let window_or_default = || {
        window.unwrap_or_else(|| {
            TimeRange::ending_at(now, chrono::Duration::days(DEFAULT_WINDOW_DAYS))
        })
    };

    match request.shape() {
        QueryShape::SavedQuery { query_id } => ApiRequest::post(
            ["Queries", query_id.as_str(), "execute"],
            json!({ "arguments": lql_arguments(request) }),
        ),
        QueryShape::AdHocQuery { query_text } => ApiRequest::post(
            ["Queries", "execute"],
            json!({
                "query": { "queryText": query_text },
                "arguments": lql_arguments(request),
            }),
        ),
        QueryShape::ResourceListing {
            provider,
            resource_type,
        } => {
            let filters: Vec<JsonValue> = resource_type
                .iter()
                .filter_map(|rt| field_filter("resourceType", std::slice::from_ref(rt)))
                .collect();
            ApiRequest::post(
                ["Inventory", "search"],
                json!({
                    "timeFilter": time_filter(window_or_default()),
                    "csp": provider.csp(),
                    "filters": filters,
                }),
            )
        }
        QueryShape::Alerts => {
            let window = window_or_default();
            let mut req = ApiRequest::get(["Alerts"])
                .with_query("startTime", format_timestamp(window.start))
                .with_query("endTime", format_timestamp(window.end));
            if let Some(limit) = remaining {
                req = req.with_query("limit", limit.to_string());
            }
            req
        }
        QueryShape::ComplianceSearch {
            statuses,
            account_ids,
            returns,
        } => {
            let filters: Vec<JsonValue> = [
                field_filter("status", statuses),
                field_filter("account.AccountId", account_ids),
            ]
            .into_iter()
            .flatten()
            .collect();
            let page_size = remaining
                .unwrap_or(MAX_COMPLIANCE_PAGE_SIZE)
                .clamp(1, MAX_COMPLIANCE_PAGE_SIZE);
            ApiRequest::post(
                ["Configs", "ComplianceEvaluations", "search"],
                json!({
                    "timeFilter": time_filter(window_or_default()),
                    "dataset": "AwsCompliance",
                    "filters": filters,
                    "returns": returns,
                    "paging": { "limit": page_size },
                }),
            )
        }
    }
}

/// Request for the page after `cursor`, derived from the window's first request.
///
/// `remaining` is the number of rows still wanted from this window; a page
/// size on the first request is lowered to match.
pub fn next_page(first: &ApiRequest, cursor: &Cursor, remaining: Option<usize>) -> ApiRequest {
    match cursor {
        Cursor::NextPage(url) => ApiRequest::follow(url.clone()),
        Cursor::Token(token) => {
            let mut next = first.clone();
            match next.body.as_mut().and_then(JsonValue::as_object_mut) {
                Some(body) => {
                    let paging = body
                        .entry("paging")
                        .or_insert_with(|| JsonValue::Object(Map::new()));
                    if !paging.is_object() {
                        *paging = JsonValue::Object(Map::new());
                    }
                    if let Some(paging) = paging.as_object_mut() {
                        paging.insert("cursor".to_string(), JsonValue::String(token.clone()));
                        if let (Some(rows), true) = (remaining, paging.contains_key("limit")) {
                            paging.insert(
                                "limit".to_string(),
                                json!(rows.clamp(1, MAX_COMPLIANCE_PAGE_SIZE)),
                            );
                        }
                    }
                }
                None => {
                    next.query.retain(|(k, _)| k != "cursor");
                    if let Some(rows) = remaining {
                        for (key, value) in next.query.iter_mut() {
                            if key == "limit" {
                                *value = rows.max(1).to_string();
                            }
                        }
                    }
                    next.query.push(("cursor".to_string(), token.clone()));
                }
            }
            next
        }
    }
}
