//! Declarative argument schemas for the built-in tools.
//!
//! Each tool declares its arguments as a list of [`ArgSpec`]s. The
//! dispatcher validates a raw argument object against the schema before any
//! request is built, so malformed calls never reach the network.

use crate::error::ArgumentError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

pub const PING: &str = "ping";
pub const RUN_LQL_QUERY: &str = "run_lql_query";
pub const LIST_RESOURCES: &str = "list_resources";
pub const LIST_ALERTS: &str = "list_alerts";
pub const SEARCH_AWS_COMPLIANCE: &str = "search_aws_compliance";

/// Largest `limit` a caller may request.
pub const MAX_LIMIT: usize = 100_000;

/// Expected JSON type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Non-blank string.
    String,
    /// A string or an array of strings.
    StringList,
    /// Object of string (or scalar) values.
    StringMap,
    /// `YYYY-MM-DDTHH:MM:SSZ`, any RFC 3339 timestamp, or `YYYY-MM-DD`.
    Timestamp,
    /// Integer in `1..=MAX_LIMIT`.
    PositiveInteger,
    /// One of a fixed set of strings, case-insensitive.
    OneOf(&'static [&'static str]),
}

impl ArgKind {
    fn expected(&self) -> &'static str {
        match self {
            Self::String => "a non-empty string",
            Self::StringList => "a string or an array of strings",
            Self::StringMap => "an object of string values",
            Self::Timestamp => "a timestamp string",
            Self::PositiveInteger => "a positive integer",
            Self::OneOf(_) => "one of the documented values",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

impl ArgSpec {
    pub const fn required(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// A validated argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    String(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
    Timestamp(DateTime<Utc>),
    Integer(usize),
}

/// Arguments that passed validation, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedArgs {
    values: BTreeMap<&'static str, ArgValue>,
}

impl ValidatedArgs {
    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(ArgValue::List(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    pub fn map(&self, name: &str) -> BTreeMap<String, String> {
        match self.values.get(name) {
            Some(ArgValue::Map(m)) => m.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.values.get(name) {
            Some(ArgValue::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<usize> {
        match self.values.get(name) {
            Some(ArgValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }
}

/// Argument schema of one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSchema {
    pub name: &'static str,
    pub args: Vec<ArgSpec>,
}

impl ToolSchema {
    pub fn new(name: &'static str, args: Vec<ArgSpec>) -> Self {
        Self { name, args }
    }

    /// Check `args` against the schema. `null` counts as absent.
    pub fn validate(&self, args: &Map<String, JsonValue>) -> Result<ValidatedArgs, ArgumentError> {
        if let Some(unknown) = args
            .keys()
            .find(|key| !self.args.iter().any(|spec| spec.name == key.as_str()))
        {
            return Err(ArgumentError::UnknownArgument {
                name: unknown.clone(),
            });
        }

        let mut validated = ValidatedArgs::default();
        for spec in &self.args {
            match args.get(spec.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    let parsed = parse_value(spec, value)?;
                    validated.values.insert(spec.name, parsed);
                }
                None if spec.required => {
                    return Err(ArgumentError::Missing {
                        name: spec.name.to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(validated)
    }
}

fn wrong_type(spec: &ArgSpec) -> ArgumentError {
    ArgumentError::WrongType {
        name: spec.name.to_string(),
        expected: spec.kind.expected(),
    }
}

fn non_blank(spec: &ArgSpec, s: &str) -> Result<String, ArgumentError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ArgumentError::Blank {
            name: spec.name.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Render a scalar parameter value as the string LQL expects.
fn scalar_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_value(spec: &ArgSpec, value: &JsonValue) -> Result<ArgValue, ArgumentError> {
    match spec.kind {
        ArgKind::String => {
            let s = value.as_str().ok_or_else(|| wrong_type(spec))?;
            Ok(ArgValue::String(non_blank(spec, s)?))
        }
        ArgKind::StringList => {
            let items = match value {
                JsonValue::String(s) => vec![non_blank(spec, s)?],
                JsonValue::Array(items) => items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .ok_or_else(|| wrong_type(spec))
                            .and_then(|s| non_blank(spec, s))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(wrong_type(spec)),
            };
            Ok(ArgValue::List(items))
        }
        ArgKind::StringMap => {
            let object = value.as_object().ok_or_else(|| wrong_type(spec))?;
            let mut map = BTreeMap::new();
            for (key, v) in object {
                if key.trim().is_empty() {
                    return Err(ArgumentError::invalid(format!(
                        "'{}' contains a blank parameter name",
                        spec.name
                    )));
                }
                let s = scalar_string(v).ok_or_else(|| wrong_type(spec))?;
                map.insert(key.trim().to_string(), s);
            }
            Ok(ArgValue::Map(map))
        }
        ArgKind::Timestamp => {
            let s = value.as_str().ok_or_else(|| wrong_type(spec))?;
            let s = non_blank(spec, s)?;
            parse_timestamp(&s)
                .map(ArgValue::Timestamp)
                .ok_or_else(|| ArgumentError::BadTimestamp {
                    name: spec.name.to_string(),
                })
        }
        ArgKind::PositiveInteger => {
            let n = value.as_u64().ok_or_else(|| wrong_type(spec))?;
            usize::try_from(n)
                .ok()
                .filter(|n| (1..=MAX_LIMIT).contains(n))
                .map(ArgValue::Integer)
                .ok_or_else(|| {
                    ArgumentError::invalid(format!(
                        "'{}' must be between 1 and {}",
                        spec.name, MAX_LIMIT
                    ))
                })
        }
        ArgKind::OneOf(allowed) => {
            let s = value.as_str().ok_or_else(|| wrong_type(spec))?;
            let s = non_blank(spec, s)?;
            allowed
                .iter()
                .find(|a| a.eq_ignore_ascii_case(&s))
                .map(|a| ArgValue::String(a.to_string()))
                .ok_or_else(|| {
                    ArgumentError::invalid(format!(
                        "'{}' must be one of: {}",
                        spec.name,
                        allowed.join(", ")
                    ))
                })
        }
    }
}

/// Parse a timestamp argument. A bare date means midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ") {
        return Some(naive.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

const FORMAT: ArgSpec = ArgSpec::optional("format", ArgKind::OneOf(&["json", "table", "markdown"]));
const START_TIME: ArgSpec = ArgSpec::optional("startTime", ArgKind::Timestamp);
const END_TIME: ArgSpec = ArgSpec::optional("endTime", ArgKind::Timestamp);
const LIMIT: ArgSpec = ArgSpec::optional("limit", ArgKind::PositiveInteger);

/// Schemas of every built-in tool.
pub fn builtin_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema::new(PING, vec![]),
        ToolSchema::new(
            RUN_LQL_QUERY,
            vec![
                ArgSpec::optional("queryName", ArgKind::String),
                ArgSpec::optional("queryText", ArgKind::String),
                ArgSpec::optional("parameters", ArgKind::StringMap),
                START_TIME,
                END_TIME,
                LIMIT,
                FORMAT,
            ],
        ),
        ToolSchema::new(
            LIST_RESOURCES,
            vec![
                ArgSpec::required("provider", ArgKind::OneOf(&["aws", "azure", "gcp"])),
                ArgSpec::optional("resourceType", ArgKind::String),
                START_TIME,
                END_TIME,
                LIMIT,
                FORMAT,
            ],
        ),
        ToolSchema::new(LIST_ALERTS, vec![START_TIME, END_TIME, LIMIT, FORMAT]),
        ToolSchema::new(
            SEARCH_AWS_COMPLIANCE,
            vec![
                ArgSpec::optional("status", ArgKind::StringList),
                ArgSpec::optional("accountIds", ArgKind::StringList),
                ArgSpec::optional("returns", ArgKind::StringList),
                START_TIME,
                END_TIME,
                LIMIT,
                FORMAT,
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn schema(name: &str) -> ToolSchema {
        builtin_schemas()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap()
    }

    fn args(v: JsonValue) -> Map<String, JsonValue> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_timestamp_forms() {
        let midnight = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-01"), Some(midnight));
        assert_eq!(parse_timestamp("2025-03-01T00:00:00Z"), Some(midnight));
        assert_eq!(parse_timestamp("2025-03-01T02:00:00+02:00"), Some(midnight));
        assert_eq!(parse_timestamp("03/01/2025"), None);
        assert_eq!(parse_timestamp("2025-13-01"), None);
    }

    #[test]
    fn test_valid_list_resources() {
        let validated = schema(LIST_RESOURCES)
            .validate(&args(json!({"provider": "AWS", "resourceType": " ec2:instance "})))
            .unwrap();
        assert_eq!(validated.string("provider"), Some("aws"));
        assert_eq!(validated.string("resourceType"), Some("ec2:instance"));
        assert_eq!(validated.integer("limit"), None);
    }

    #[test]
    fn test_missing_required() {
        let err = schema(LIST_RESOURCES).validate(&args(json!({}))).unwrap_err();
        assert_eq!(
            err,
            ArgumentError::Missing {
                name: "provider".into()
            }
        );
    }

    #[test]
    fn test_null_counts_as_absent() {
        let validated = schema(LIST_ALERTS)
            .validate(&args(json!({"limit": null, "startTime": null})))
            .unwrap();
        assert_eq!(validated, ValidatedArgs::default());
    }

    #[test]
    fn test_unknown_argument() {
        let err = schema(LIST_ALERTS)
            .validate(&args(json!({"severity": "high"})))
            .unwrap_err();
        assert!(matches!(err, ArgumentError::UnknownArgument { name } if name == "severity"));
    }

    #[test]
    fn test_wrong_types_and_blanks() {
        let s = schema(RUN_LQL_QUERY);
        assert!(matches!(
            s.validate(&args(json!({"queryName": 5}))),
            Err(ArgumentError::WrongType { .. })
        ));
        assert!(matches!(
            s.validate(&args(json!({"queryName": "   "}))),
            Err(ArgumentError::Blank { .. })
        ));
        assert!(matches!(
            s.validate(&args(json!({"parameters": {"A": [1]}}))),
            Err(ArgumentError::WrongType { .. })
        ));
        assert!(matches!(
            s.validate(&args(json!({"limit": 0}))),
            Err(ArgumentError::Invalid { .. })
        ));
        assert!(matches!(
            s.validate(&args(json!({"limit": -3}))),
            Err(ArgumentError::WrongType { .. })
        ));
        assert!(matches!(
            s.validate(&args(json!({"startTime": "yesterday"}))),
            Err(ArgumentError::BadTimestamp { .. })
        ));
        assert!(matches!(
            s.validate(&args(json!({"format": "csv"}))),
            Err(ArgumentError::Invalid { .. })
        ));
    }

    #[test]
    fn test_parameters_accept_scalars() {
        let validated = schema(RUN_LQL_QUERY)
            .validate(&args(json!({
                "queryName": "q",
                "parameters": {"Region": "ca-central-1", "Days": 7, "Strict": true}
            })))
            .unwrap();
        let params = validated.map("parameters");
        assert_eq!(params["Region"], "ca-central-1");
        assert_eq!(params["Days"], "7");
        assert_eq!(params["Strict"], "true");
    }

    #[test]
    fn test_string_list_accepts_single_string() {
        let validated = schema(SEARCH_AWS_COMPLIANCE)
            .validate(&args(json!({"status": "NonCompliant", "accountIds": ["1", "2"]})))
            .unwrap();
        assert_eq!(validated.list("status"), vec!["NonCompliant"]);
        assert_eq!(validated.list("accountIds"), vec!["1", "2"]);
        assert!(validated.list("returns").is_empty());
    }
}
