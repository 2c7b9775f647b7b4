//! MCP service implementation using rmcp.
//!
//! Tool inputs are typed so clients get accurate JSON schemas, but values
//! are accepted loosely and handed to the [`Dispatcher`] as a raw argument
//! object. Validation happens there, so a malformed call comes back as an
//! `invalid_arguments` tool result rather than a protocol error.

use crate::models::ToolResponse;
use crate::tools::Dispatcher;
use crate::tools::schema::{
    LIST_ALERTS, LIST_RESOURCES, PING, RUN_LQL_QUERY, SEARCH_AWS_COMPLIANCE,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    schemars::JsonSchema,
    tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Time window and output options shared by every query tool.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WindowInput {
    /// Window start: YYYY-MM-DDTHH:MM:SSZ or YYYY-MM-DD (midnight UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub start_time: Option<JsonValue>,
    /// Window end: YYYY-MM-DDTHH:MM:SSZ or YYYY-MM-DD. Default: now
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub end_time: Option<JsonValue>,
    /// Maximum rows to fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<u32>")]
    pub limit: Option<JsonValue>,
    /// Output format: "json" (default), "table" or "markdown"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub format: Option<JsonValue>,
}

/// Input for the run_lql_query tool.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunLqlQueryInput {
    /// Id of a saved LQL query, e.g. "samv_out_of_canada". Mutually exclusive with queryText
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub query_name: Option<JsonValue>,
    /// Ad-hoc LQL text. Mutually exclusive with queryName
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub query_text: Option<JsonValue>,
    /// LQL parameters by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<BTreeMap<String, String>>")]
    pub parameters: Option<JsonValue>,
    #[serde(flatten)]
    pub window: WindowInput,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, JsonValue>,
}

/// Input for the list_resources tool.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesInput {
    /// Cloud provider: "aws", "azure" or "gcp"
    #[schemars(with = "String")]
    pub provider: Option<JsonValue>,
    /// Inventory resource type, e.g. "ec2:instance"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub resource_type: Option<JsonValue>,
    #[serde(flatten)]
    pub window: WindowInput,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, JsonValue>,
}

/// Input for the list_alerts tool.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ListAlertsInput {
    #[serde(flatten)]
    pub window: WindowInput,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, JsonValue>,
}

/// Input for the search_aws_compliance tool.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchComplianceInput {
    /// Evaluation status filter, e.g. "NonCompliant"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<Vec<String>>")]
    pub status: Option<JsonValue>,
    /// AWS account ids to include
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<Vec<String>>")]
    pub account_ids: Option<JsonValue>,
    /// Fields to return. Default: account, id, recommendation, severity, status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<Vec<String>>")]
    pub returns: Option<JsonValue>,
    #[serde(flatten)]
    pub window: WindowInput,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, JsonValue>,
}

/// Flatten a typed input back into the raw argument object.
fn arguments<T: Serialize>(input: &T) -> Result<Map<String, JsonValue>, McpError> {
    match serde_json::to_value(input) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Ok(Map::new()),
        Err(e) => Err(McpError::internal_error(e.to_string(), None)),
    }
}

#[derive(Clone)]
pub struct LaceworkService {
    dispatcher: Arc<Dispatcher>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl LaceworkService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            tool_router: Self::tool_router(),
        }
    }

    async fn call<T: Serialize>(&self, tool: &str, input: &T) -> Result<Json<ToolResponse>, McpError> {
        let args = arguments(input)?;
        Ok(Json(self.dispatcher.dispatch(tool, args).await))
    }
}

#[tool_router]
impl LaceworkService {
    #[tool(
        description = "Check that the configured Lacework credentials can obtain an API token.\nReturns whether authentication succeeded and when the token expires."
    )]
    async fn ping(&self) -> Json<ToolResponse> {
        Json(self.dispatcher.dispatch(PING, Map::new()).await)
    }

    #[tool(
        description = "Run a Lacework LQL query and return its rows.\nGive either `queryName` (a saved query id) or `queryText` (ad-hoc LQL), plus optional `parameters`.\n`startTime`/`endTime` bind StartTimeRange/EndTimeRange."
    )]
    async fn run_lql_query(
        &self,
        Parameters(input): Parameters<RunLqlQueryInput>,
    ) -> Result<Json<ToolResponse>, McpError> {
        self.call(RUN_LQL_QUERY, &input).await
    }

    #[tool(
        description = "List cloud resources from the Lacework inventory.\nFilter by `provider` (aws, azure, gcp) and optional `resourceType` (e.g. ec2:instance). Default window: last day."
    )]
    async fn list_resources(
        &self,
        Parameters(input): Parameters<ListResourcesInput>,
    ) -> Result<Json<ToolResponse>, McpError> {
        self.call(LIST_RESOURCES, &input).await
    }

    #[tool(description = "List Lacework alerts in a time window. Default window: last 7 days.")]
    async fn list_alerts(
        &self,
        Parameters(input): Parameters<ListAlertsInput>,
    ) -> Result<Json<ToolResponse>, McpError> {
        self.call(LIST_ALERTS, &input).await
    }

    #[tool(
        description = "Search AWS compliance evaluations.\nFilter by `status` and `accountIds`; windows longer than 7 days are searched in 7 day slices. Default window: last 7 days."
    )]
    async fn search_aws_compliance(
        &self,
        Parameters(input): Parameters<SearchComplianceInput>,
    ) -> Result<Json<ToolResponse>, McpError> {
        self.call(SEARCH_AWS_COMPLIANCE, &input).await
    }
}

#[tool_handler]
impl ServerHandler for LaceworkService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "lacework-mcp-server".to_owned(),
                title: Some("Lacework MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Lacework cloud security tools.\n\
                \n\
                ## Workflow\n\
                1. Call `ping` to confirm the credentials work\n\
                2. Use `list_resources` for inventory, `run_lql_query` for saved or ad-hoc LQL\n\
                3. Use `list_alerts` and `search_aws_compliance` for findings\n\
                \n\
                ## Results\n\
                Every tool returns `{status, payload | error}`. Large results are cut to the \
                first rows (`summarized: true`); `row_count` always reports the full count. \
                `truncated: true` means the platform had more pages than were fetched.\n\
                \n\
                ## Time Arguments\n\
                `startTime`/`endTime` accept YYYY-MM-DDTHH:MM:SSZ or YYYY-MM-DD (midnight UTC)."
                    .to_string(),
            ),
        }
    }
}
