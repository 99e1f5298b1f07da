use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use csa_config::{GlobalConfig, McpServerConfig};

const DEFAULT_HTTP_BIND: &str = "127.0.0.1";
const DEFAULT_HTTP_PORT: u16 = 0;
const DEFAULT_MAX_CONNECTIONS: usize = 32;
const DEFAULT_MAX_REQUESTS_PER_SEC: u32 = 100;
const DEFAULT_MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub(crate) struct HubConfig {
    pub(crate) socket_path: PathBuf,
    pub(crate) pid_path: PathBuf,
    pub(crate) mcp_servers: Vec<McpServerConfig>,
    pub(crate) http_bind: String,
    pub(crate) http_port: u16,
    pub(crate) max_connections: usize,
    pub(crate) max_requests_per_sec: u32,
    pub(crate) max_request_body_bytes: usize,
    pub(crate) request_timeout_secs: u64,
}

impl HubConfig {
    pub(crate) fn load(
        socket_override: Option<PathBuf>,
        http_bind_override: Option<String>,
        http_port_override: Option<u16>,
    ) -> Result<Self> {
        let global = GlobalConfig::load()?;
        Ok(Self::from_global_config(
            &global,
            socket_override,
            http_bind_override,
            http_port_override,
        ))
    }

    pub(crate) fn from_global_config(
        global: &GlobalConfig,
        socket_override: Option<PathBuf>,
        http_bind_override: Option<String>,
        http_port_override: Option<u16>,
    ) -> Self {
        let socket_path = socket_override
            .or_else(|| global.mcp_proxy_socket.clone().map(PathBuf::from))
            .unwrap_or_else(default_socket_path);
        let pid_path = pid_path_for_socket(&socket_path);
        Self {
            socket_path,
            pid_path,
            mcp_servers: global.mcp_servers().to_vec(),
            http_bind: http_bind_override.unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string()),
            http_port: http_port_override.unwrap_or(DEFAULT_HTTP_PORT),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_requests_per_sec: DEFAULT_MAX_REQUESTS_PER_SEC,
            max_request_body_bytes: DEFAULT_MAX_REQUEST_BODY_BYTES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub(crate) fn default_socket_path() -> PathBuf {
    socket_path_from_runtime_dir(
        std::env::var("XDG_RUNTIME_DIR").ok().as_deref(),
        effective_uid(),
    )
}

pub(crate) fn pid_path_for_socket(socket_path: &Path) -> PathBuf {
    let mut buf: OsString = socket_path.as_os_str().to_owned();
    buf.push(".pid");
    PathBuf::from(buf)
}

fn effective_uid() -> u32 {
    #[cfg(unix)]
    {
        // SAFETY: `geteuid` has no preconditions and returns caller effective UID.
        unsafe { libc::geteuid() }
    }

    #[cfg(not(unix))]
    {
        0
    }
}

fn socket_path_from_runtime_dir(runtime_dir: Option<&str>, uid: u32) -> PathBuf {
    if let Some(runtime_dir) = runtime_dir {
        return PathBuf::from(runtime_dir).join("csa").join("mcp-hub.sock");
    }

    PathBuf::from("/tmp")
        .join(format!("csa-{uid}"))
        .join("mcp-hub.sock")
}
