use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mcp::types::ClientInfo;
use crate::mcp::DEFAULT_PROTOCOL_VERSION;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_ROUTE_PREFIX: &str = "mcp/tools";
pub const DEFAULT_CLIENT_NAME: &str = "toolwire";
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;
pub const BASE_URL_ENV_VAR: &str = "TOOLWIRE_BASE_URL";

/// A named third-party server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExternalServer {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Origin of the co-located server (e.g., "http://127.0.0.1:8000")
    pub base_url: Option<String>,
    /// Path segment(s) between the origin and the tool name for local calls
    pub route_prefix: Option<String>,
    /// Protocol revision announced in `initialize`
    pub protocol_version: Option<String>,
    pub client_name: Option<String>,
    pub client_version: Option<String>,
    /// Send `notifications/initialized` after a successful handshake
    pub initialized_notification: Option<bool>,
    pub connect_timeout_seconds: Option<u64>,
    pub request_timeout_seconds: Option<u64>,
    /// Keep external sessions on disk between CLI runs
    pub persist_sessions: Option<bool>,
    #[serde(default)]
    pub servers: Vec<ExternalServer>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn route_prefix(&self) -> &str {
        self.route_prefix.as_deref().unwrap_or(DEFAULT_ROUTE_PREFIX)
    }

    pub fn protocol_version(&self) -> &str {
        self.protocol_version
            .as_deref()
            .filter(|version| !version.trim().is_empty())
            .unwrap_or(DEFAULT_PROTOCOL_VERSION)
    }

    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            name: self
                .client_name
                .clone()
                .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
            version: self
                .client_version
                .clone()
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        }
    }

    pub fn sends_initialized_notification(&self) -> bool {
        self.initialized_notification.unwrap_or(true)
    }

    pub fn persists_sessions(&self) -> bool {
        self.persist_sessions.unwrap_or(true)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_seconds
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_seconds
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        )
    }

    pub fn get_server(&self, id: &str) -> Option<&ExternalServer> {
        self.servers
            .iter()
            .find(|server| server.id.eq_ignore_ascii_case(id))
    }

    /// A configured server id resolves to its URL; anything else is taken
    /// to be a URL already.
    pub fn resolve_server_url(&self, server: &str) -> String {
        self.get_server(server)
            .map(|server| server.url.clone())
            .unwrap_or_else(|| server.to_string())
    }

    pub fn add_server(&mut self, server: ExternalServer) {
        self.remove_server(&server.id);
        self.servers.push(server);
    }

    /// Returns whether a server with that id was configured.
    pub fn remove_server(&mut self, id: &str) -> bool {
        let before = self.servers.len();
        self.servers
            .retain(|server| !server.id.eq_ignore_ascii_case(id));
        self.servers.len() != before
    }

    /// Applies `TOOLWIRE_BASE_URL` when set and non-blank.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var(BASE_URL_ENV_VAR) {
            if !base_url.trim().is_empty() {
                self.base_url = Some(base_url.trim().to_string());
            }
        }
    }
}
