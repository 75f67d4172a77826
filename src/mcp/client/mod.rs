//! The tool-call client.
//!
//! One [`ToolClient`] serves both call paths:
//! - local calls go to the co-located server, one stateless POST per call;
//! - external calls go to third-party servers through a negotiated session
//!   managed by [`session::SessionManager`].
//!
//! Both paths share framing, response decoding and result unwrapping. The
//! client is cheap to clone; clones share the HTTP pool, credentials,
//! session store and request id counter.

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::data::{
    Config, DEFAULT_CONNECT_TIMEOUT_SECONDS, DEFAULT_REQUEST_TIMEOUT_SECONDS,
};
use crate::core::credentials::CredentialProvider;
use crate::mcp::error::{Result, ToolCallError};
use crate::mcp::types::ClientInfo;
use crate::utils::url::construct_api_url;

mod operations;
pub mod protocol;
pub mod session;
mod transport_http;

pub use operations::MAX_SESSION_RETRIES;
pub use protocol::{decode_content, unwrap_all, unwrap_call_result, ContentValue};
pub use session::{
    FileSessionStore, InMemorySessionStore, Session, SessionManager, SessionStore,
};

use transport_http::RequestIds;

const MCP_HTTP_POOL_IDLE_TIMEOUT_SECONDS: u64 = 90;
const MCP_HTTP_POOL_MAX_IDLE_PER_HOST: usize = 8;

/// Everything about the protocol conversation that does not change per call.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub route_prefix: String,
    pub protocol_version: String,
    pub client_info: ClientInfo,
    pub initialized_notification: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            route_prefix: config.route_prefix().to_string(),
            protocol_version: config.protocol_version().to_string(),
            client_info: config.client_info(),
            initialized_notification: config.sends_initialized_notification(),
        }
    }

    /// Same-origin endpoint for a local tool: `{base}/{prefix}/{method}`.
    /// The method is always one path segment; `/`, `?` and `#` are escaped.
    pub fn local_endpoint(&self, method: &str) -> String {
        let method = urlencoding::encode(method);
        let prefix = self.route_prefix.trim_matches('/');
        if prefix.is_empty() {
            construct_api_url(&self.base_url, &method)
        } else {
            construct_api_url(&construct_api_url(&self.base_url, prefix), &method)
        }
    }
}

fn build_mcp_http_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .pool_idle_timeout(Duration::from_secs(MCP_HTTP_POOL_IDLE_TIMEOUT_SECONDS))
        .pool_max_idle_per_host(MCP_HTTP_POOL_MAX_IDLE_PER_HOST)
        .build()
        .map_err(ToolCallError::from)
}

#[derive(Clone)]
pub struct ToolClient {
    http: reqwest::Client,
    settings: Arc<ClientSettings>,
    credentials: Arc<dyn CredentialProvider>,
    sessions: SessionManager,
    request_ids: RequestIds,
}

impl ToolClient {
    pub fn builder(credentials: Arc<dyn CredentialProvider>) -> ToolClientBuilder {
        ToolClientBuilder::new(credentials)
    }

    /// Client with settings and timeouts from `config` and in-memory sessions.
    pub fn from_config(config: &Config, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        Self::builder(credentials).config(config).build()
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Non-blank token or [`ToolCallError::Auth`]; checked before any I/O.
    async fn require_token(&self) -> Result<String> {
        self.credentials
            .token()
            .await
            .ok_or_else(ToolCallError::not_authenticated)
    }

    /// Surfaces a 401 to the credential source before returning the error.
    async fn report_failure(&self, err: ToolCallError) -> ToolCallError {
        if err.is_unauthorized() {
            self.credentials.on_unauthorized().await;
        }
        err
    }
}

pub struct ToolClientBuilder {
    credentials: Arc<dyn CredentialProvider>,
    settings: ClientSettings,
    store: Option<Arc<dyn SessionStore>>,
    http: Option<reqwest::Client>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl ToolClientBuilder {
    fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            credentials,
            settings: ClientSettings::default(),
            store: None,
            http: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        }
    }

    pub fn config(mut self, config: &Config) -> Self {
        self.settings = ClientSettings::from_config(config);
        self.connect_timeout = config.connect_timeout();
        self.request_timeout = config.request_timeout();
        self
    }

    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.settings.base_url = base_url.into();
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Supplies a preconfigured HTTP client; the timeouts are then ignored.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<ToolClient> {
        let http = match self.http {
            Some(http) => http,
            None => build_mcp_http_client(self.connect_timeout, self.request_timeout)?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));
        let settings = Arc::new(self.settings);
        let request_ids = RequestIds::new();
        let sessions = SessionManager::new(
            http.clone(),
            store,
            Arc::clone(&settings),
            request_ids.clone(),
        );

        Ok(ToolClient {
            http,
            settings,
            credentials: self.credentials,
            sessions,
            request_ids,
        })
    }
}
