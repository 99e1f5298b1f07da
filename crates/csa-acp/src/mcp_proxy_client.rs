use std::path::PathBuf;

use serde_json::{Map, Value, json};

use crate::session_config::{McpServerConfig, SessionConfig};

const PROXY_SERVER_NAME: &str = "csa-mcp-hub";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpProxyClient {
    socket_path: PathBuf,
}

impl McpProxyClient {
    pub fn from_session_config(config: &SessionConfig) -> Option<Self> {
        config
            .mcp_proxy_socket
            .as_deref()
            .map(PathBuf::from)
            .map(|socket_path| Self { socket_path })
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    pub fn build_proxy_meta_entry(&self) -> Value {
        json!({
            "transport": "unix",
            "socketPath": self.socket_path,
        })
    }
}

/// Resolve MCP server metadata for ACP session/new meta injection.
///
/// Behavior:
/// - If `mcp_proxy_socket` is configured and exists, inject a single proxy entry.
/// - Otherwise, fall back to direct MCP server entries from `mcp_servers`.
pub fn resolve_mcp_meta_servers(config: &SessionConfig) -> Value {
    if let Some(proxy) = McpProxyClient::from_session_config(config)
        && proxy.socket_exists()
    {
        let mut proxy_map = Map::new();
        proxy_map.insert(
            PROXY_SERVER_NAME.to_string(),
            proxy.build_proxy_meta_entry(),
        );
        return Value::Object(proxy_map);
    }

    direct_mcp_meta_servers(&config.mcp_servers)
}

pub fn direct_mcp_meta_servers(servers: &[McpServerConfig]) -> Value {
    let mut map = Map::new();
    for server in servers {
        map.insert(
            server.name.clone(),
            json!({
                "command": server.command,
                "args": server.args,
                "env": server.env,
            }),
        );
    }
    Value::Object(map)
}
