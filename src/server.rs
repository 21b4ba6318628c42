use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::accounts::StorageAccountTools;
use crate::auth::AuthManager;
use crate::error::{Result as ToolResult, StorageMcpError};
use crate::logging::ToolExecutionRecord;
use crate::metrics::MetricsTools;
use crate::models::{
    GetNetworkRulesRequest, GetPrivateEndpointsRequest, GetStorageAccountDetailsRequest,
    GetStorageMetricsRequest, ListStorageAccountsRequest,
};
use crate::network::NetworkTools;

// ---------------------------------------------------------------------------
// Tool arguments
// ---------------------------------------------------------------------------

/// Raw tool arguments advertised with the schema of request type `T`.
///
/// Decoding into `T` is left to [`StorageMcpServer::call_tool`] so that shape
/// mismatches are reported as validation errors like any other bad input.
#[derive(Debug)]
pub struct ToolArguments<T> {
    raw: Value,
    _request: PhantomData<fn() -> T>,
}

impl<'de, T> Deserialize<'de> for ToolArguments<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self {
            raw: Value::deserialize(deserializer)?,
            _request: PhantomData,
        })
    }
}

impl<T: JsonSchema> JsonSchema for ToolArguments<T> {
    fn schema_name() -> Cow<'static, str> {
        T::schema_name()
    }

    fn schema_id() -> Cow<'static, str> {
        T::schema_id()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        T::json_schema(generator)
    }
}

// ---------------------------------------------------------------------------
// Error rendering
// ---------------------------------------------------------------------------

const VALIDATION_CATEGORY: &str = "Validation error";
const DOMAIN_CATEGORY: &str = "Azure Storage MCP error";
const UNEXPECTED_CATEGORY: &str = "Unexpected error";

fn error_text(category: &str, message: impl std::fmt::Display) -> String {
    format!("ERROR: {category}: {message}")
}

fn render_error(err: &StorageMcpError) -> String {
    if err.is_validation() {
        error_text(VALIDATION_CATEGORY, err)
    } else {
        error_text(DOMAIN_CATEGORY, err)
    }
}

fn render<T: Serialize>(result: ToolResult<T>) -> Result<String, String> {
    let response = result.map_err(|e| render_error(&e))?;
    serde_json::to_string_pretty(&response).map_err(|e| error_text(UNEXPECTED_CATEGORY, e))
}

/// Decode `arguments` for `tool`.  Failures are logged here since no
/// domain tool is reached.
fn parse<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, String> {
    serde_json::from_value(arguments.clone()).map_err(|e| {
        let err = StorageMcpError::validation(format!("Invalid arguments for {tool}: {e}"), "arguments".into());
        ToolExecutionRecord::failure(tool, None, &arguments, &err).emit();
        render_error(&err)
    })
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// MCP server exposing read-only Azure Storage introspection tools.
#[derive(Clone)]
pub struct StorageMcpServer {
    accounts: Arc<StorageAccountTools>,
    network: Arc<NetworkTools>,
    metrics: Arc<MetricsTools>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for StorageMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "azure-storage-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "This MCP server provides read-only introspection of Azure Storage \
                 accounts.  Use list_storage_accounts to discover accounts, \
                 get_storage_account_details for configuration and security \
                 posture, get_network_rules and get_private_endpoints for network \
                 exposure, and get_storage_metrics for Azure Monitor usage data."
                    .into(),
            ),
        }
    }
}

#[tool_router]
impl StorageMcpServer {
    /// List storage accounts in a subscription or resource group.
    #[tool(description = "List Azure Storage accounts in a subscription, optionally \
                          filtered to one resource group.  Returns a summary per \
                          account and a distribution by region.")]
    async fn list_storage_accounts(
        &self,
        Parameters(args): Parameters<ToolArguments<ListStorageAccountsRequest>>,
    ) -> Result<String, String> {
        self.call_tool("list_storage_accounts", args.raw).await
    }

    /// Full configuration of one storage account.
    #[tool(description = "Get detailed configuration of a storage account: basic \
                          properties, security settings, network configuration and \
                          blob service properties.")]
    async fn get_storage_account_details(
        &self,
        Parameters(args): Parameters<ToolArguments<GetStorageAccountDetailsRequest>>,
    ) -> Result<String, String> {
        self.call_tool("get_storage_account_details", args.raw).await
    }

    /// Network ACL of a storage account.
    #[tool(description = "Get the network access rules of a storage account: default \
                          action, IP rules, virtual network rules, resource access \
                          rules and bypass.")]
    async fn get_network_rules(
        &self,
        Parameters(args): Parameters<ToolArguments<GetNetworkRulesRequest>>,
    ) -> Result<String, String> {
        self.call_tool("get_network_rules", args.raw).await
    }

    /// Private endpoint connections of a storage account.
    #[tool(description = "Get the private endpoint connections of a storage account \
                          and their connection states.")]
    async fn get_private_endpoints(
        &self,
        Parameters(args): Parameters<ToolArguments<GetPrivateEndpointsRequest>>,
    ) -> Result<String, String> {
        self.call_tool("get_private_endpoints", args.raw).await
    }

    /// Azure Monitor metrics for a storage account.
    #[tool(description = "Get Azure Monitor metrics for a storage account over the last \
                          1h, 24h, 7d or 30d.  Defaults to UsedCapacity and Transactions \
                          with Average aggregation at PT1H.")]
    async fn get_storage_metrics(
        &self,
        Parameters(args): Parameters<ToolArguments<GetStorageMetricsRequest>>,
    ) -> Result<String, String> {
        self.call_tool("get_storage_metrics", args.raw).await
    }
}

impl StorageMcpServer {
    /// Create a new server whose tools share `auth` and call `arm_endpoint`.
    pub fn new(auth: Arc<AuthManager>, arm_endpoint: &str) -> Self {
        Self {
            accounts: Arc::new(StorageAccountTools::new(auth.clone(), arm_endpoint)),
            network: Arc::new(NetworkTools::new(auth.clone(), arm_endpoint)),
            metrics: Arc::new(MetricsTools::new(auth, arm_endpoint)),
            tool_router: Self::tool_router(),
        }
    }

    /// Run tool `name` with raw JSON `arguments`.
    ///
    /// Success is the pretty-printed response; failure is a single
    /// `ERROR: {category}: {message}` line.  Never panics.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, String> {
        match name {
            "list_storage_accounts" => {
                let request: ListStorageAccountsRequest = parse(name, arguments)?;
                render(self.accounts.list_storage_accounts(&request).await)
            }
            "get_storage_account_details" => {
                let request: GetStorageAccountDetailsRequest = parse(name, arguments)?;
                render(self.accounts.get_storage_account_details(&request).await)
            }
            "get_network_rules" => {
                let request: GetNetworkRulesRequest = parse(name, arguments)?;
                render(self.network.get_network_rules(&request).await)
            }
            "get_private_endpoints" => {
                let request: GetPrivateEndpointsRequest = parse(name, arguments)?;
                render(self.network.get_private_endpoints(&request).await)
            }
            "get_storage_metrics" => {
                let request: GetStorageMetricsRequest = parse(name, arguments)?;
                render(self.metrics.get_storage_metrics(&request).await)
            }
            unknown => {
                let err = StorageMcpError::unknown(format!("Unknown tool: {unknown}"));
                ToolExecutionRecord::failure(unknown, None, &arguments, &err).emit();
                Err(render_error(&err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::static_auth;
    use crate::logging::capture::CaptureLayer;
    use crate::logging::TOOL_EXECUTION_TARGET;
    use crate::tool::testing::{account_json, SUBSCRIPTION_ID};
    use serde_json::json;
    use tracing_subscriber::layer::SubscriberExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_server(endpoint: &str) -> StorageMcpServer {
        StorageMcpServer::new(static_auth(), endpoint)
    }

    #[test]
    fn server_info_contains_correct_name() {
        let server = make_server("http://localhost:1");
        let info = server.get_info();
        assert_eq!(info.server_info.name, "azure-storage-mcp");
        assert!(info.instructions.unwrap().contains("get_storage_metrics"));
    }

    #[test]
    fn server_info_has_tools_capability() {
        let server = make_server("http://localhost:1");
        let info = server.get_info();
        assert!(
            info.capabilities.tools.is_some(),
            "tools capability must be present"
        );
    }

    #[test]
    fn tool_router_lists_expected_tools() {
        let server = make_server("http://localhost:1");
        let tools = server.tool_router.list_all();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();

        assert_eq!(tools.len(), 5);
        for expected in [
            "list_storage_accounts",
            "get_storage_account_details",
            "get_network_rules",
            "get_private_endpoints",
            "get_storage_metrics",
        ] {
            assert!(names.contains(&expected), "{expected} missing");
        }
    }

    #[test]
    fn tool_schemas_come_from_request_types() {
        let server = make_server("http://localhost:1");
        let tools = server.tool_router.list_all();
        let metrics = tools
            .iter()
            .find(|t| t.name == "get_storage_metrics")
            .unwrap();
        let properties = metrics.input_schema.get("properties").unwrap();
        for field in ["subscription_id", "resource_group", "account_name", "time_range", "metrics"] {
            assert!(properties.get(field).is_some(), "{field} missing from schema");
        }
    }

    #[tokio::test]
    async fn invalid_input_is_reported_as_validation_error() {
        let server = make_server("http://localhost:1");
        let err = server
            .call_tool("list_storage_accounts", json!({ "subscription_id": "nope" }))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            "ERROR: Validation error: Invalid subscription ID format. Must be a valid UUID"
        );
    }

    #[tokio::test]
    async fn malformed_arguments_are_validation_errors() {
        let server = make_server("http://localhost:1");
        let err = server
            .call_tool("get_network_rules", json!({ "subscription_id": SUBSCRIPTION_ID }))
            .await
            .unwrap_err();
        assert!(err.starts_with("ERROR: Validation error: Invalid arguments for get_network_rules"));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let server = make_server("http://localhost:1");
        let err = server.call_tool("delete_everything", json!({})).await.unwrap_err();
        assert_eq!(err, "ERROR: Azure Storage MCP error: Unknown tool: delete_everything");
    }

    #[tokio::test]
    async fn domain_failures_use_the_domain_category() {
        let azure = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&azure)
            .await;

        let server = make_server(&azure.uri());
        let err = server
            .call_tool("list_storage_accounts", json!({ "subscription_id": SUBSCRIPTION_ID }))
            .await
            .unwrap_err();
        assert!(err.starts_with("ERROR: Azure Storage MCP error: Insufficient permissions to list storage accounts"));
    }

    #[tokio::test]
    async fn successful_call_returns_pretty_json_and_one_record() {
        let azure = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [account_json("acct", "eastus")]
            })))
            .mount(&azure)
            .await;

        let capture = CaptureLayer::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

        let server = make_server(&azure.uri());
        let text = server
            .call_tool(
                "list_storage_accounts",
                json!({ "subscription_id": SUBSCRIPTION_ID, "include_deleted": true }),
            )
            .await
            .unwrap();

        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["total_count"], 1);
        assert_eq!(body["storage_accounts"][0]["name"], "acct");
        assert!(text.contains('\n'), "response should be pretty-printed");

        let records = capture.with_target(TOOL_EXECUTION_TARGET);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field("tool_name"), Some("list_storage_accounts"));
        assert_eq!(records[0].field("result_type"), Some("ListStorageAccountsResponse"));
        assert_eq!(
            records[0].field("correlation_id"),
            body["metadata"]["correlation_id"].as_str()
        );
    }
}
