use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::registry::{McpRegistry, ToolCallRoute};

#[derive(Clone)]
pub(crate) struct ProxyRouter {
    registry: Arc<McpRegistry>,
    tool_routes: Arc<RwLock<HashMap<String, String>>>,
    request_timeout: Duration,
}

impl ProxyRouter {
    pub(crate) fn new(registry: Arc<McpRegistry>, request_timeout: Duration) -> Self {
        Self {
            registry,
            tool_routes: Arc::new(RwLock::new(HashMap::new())),
            request_timeout,
        }
    }

    pub(crate) async fn status_payload(&self) -> Value {
        let servers = self.registry.server_names();
        let tools_cached = self.tool_routes.read().await.len();
        json!({
            "running": true,
            "servers": servers,
            "toolsCached": tools_cached,
        })
    }

    async fn list_tools_internal(&self) -> Result<ListToolsResult, McpError> {
        let mut tools = Vec::new();
        let mut routes = HashMap::new();

        for server in self.registry.server_names() {
            let cancellation = CancellationToken::new();
            match timeout(
                self.request_timeout,
                self.registry.list_tools(&server, cancellation.clone()),
            )
            .await
            {
                Ok(Ok(server_tools)) => {
                    for tool in server_tools {
                        routes.insert(tool.name.to_string(), server.clone());
                        tools.push(tool);
                    }
                }
                Ok(Err(error)) => {
                    tracing::warn!(server = %server, error = %error, "tools/list forwarding failed");
                }
                Err(_) => {
                    cancellation.cancel();
                    tracing::warn!(
                        server = %server,
                        timeout_secs = self.request_timeout.as_secs(),
                        "tools/list forwarding timed out"
                    );
                }
            }
        }

        *self.tool_routes.write().await = routes;
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool_internal(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, McpError> {
        let tool_name = request.name.as_ref();
        let mut server = self.lookup_tool_owner(tool_name).await;

        if server.is_none() {
            self.list_tools_internal().await?;
            server = self.lookup_tool_owner(tool_name).await;
        }

        let Some(server_name) = server else {
            return Err(McpError::invalid_params(
                format!("unknown MCP tool: {tool_name}"),
                None,
            ));
        };

        let route = call_route_from_request(&request);
        let cancellation = CancellationToken::new();
        match timeout(
            self.request_timeout,
            self.registry
                .call_tool(&server_name, request, route, cancellation.clone()),
        )
        .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(McpError::internal_error(
                format!("forwarding to MCP server '{server_name}' failed: {error}"),
                None,
            )),
            Err(_) => {
                cancellation.cancel();
                Err(McpError::internal_error(
                    format!(
                        "forwarding to MCP server '{server_name}' timed out after {}s",
                        self.request_timeout.as_secs()
                    ),
                    None,
                ))
            }
        }
    }

    async fn lookup_tool_owner(&self, tool_name: &str) -> Option<String> {
        self.tool_routes.read().await.get(tool_name).cloned()
    }
}

fn call_route_from_request(request: &CallToolRequestParam) -> ToolCallRoute {
    let Some(arguments) = request.arguments.as_ref() else {
        return ToolCallRoute::default();
    };

    ToolCallRoute {
        project_root: get_string_argument(arguments, &["project_root", "projectRoot"])
            .map(PathBuf::from),
        toolchain_hash: get_u64_argument(arguments, &["toolchain_hash", "toolchainHash"]),
    }
}

fn get_string_argument(
    arguments: &serde_json::Map<String, Value>,
    keys: &[&str],
) -> Option<String> {
    keys.iter().find_map(|key| {
        arguments
            .get(*key)
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

fn get_u64_argument(arguments: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| {
        arguments.get(*key).and_then(|value| match value {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.parse::<u64>().ok(),
            _ => None,
        })
    })
}

impl ServerHandler for ProxyRouter {
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        self.list_tools_internal().await
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.call_tool_internal(request).await
    }

    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.server_info.name = "csa-mcp-hub".to_string();
        info.server_info.version = env!("CARGO_PKG_VERSION").to_string();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info
    }
}
