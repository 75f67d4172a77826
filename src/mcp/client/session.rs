//! Negotiated sessions for third-party servers.
//!
//! At most one [`Session`] exists per server URL. Expiry is never predicted;
//! it is detected when a server rejects a request, at which point the entry
//! is removed before a fresh handshake starts. Concurrent first calls to the
//! same URL may each run a handshake; the last one stored wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::protocol::parse_response_result;
use super::transport_http::{send_json, Outgoing, RequestIds};
use super::ClientSettings;
use crate::core::config::io::{project_dirs, write_atomically, ConfigError};
use crate::mcp::error::{Result, ToolCallError};
use crate::mcp::transport::decode_response;
use crate::mcp::transport::http::session_id_from_headers;
use crate::mcp::types::{
    InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest, METHOD_INITIALIZE,
};

pub const MISSING_SESSION_ID_MESSAGE: &str = "server did not return session id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub server_url: String,
    pub session_id: String,
    /// Protocol revision the server answered `initialize` with.
    #[serde(default)]
    pub protocol_version: Option<String>,
}

/// Keyed storage for sessions. Each method is a single map operation.
pub trait SessionStore: Send + Sync {
    fn get(&self, server_url: &str) -> Option<Session>;
    fn insert(&self, session: Session);
    fn remove(&self, server_url: &str) -> Option<Session>;
    fn clear(&self);
}

fn lock_sessions(
    sessions: &Mutex<HashMap<String, Session>>,
) -> MutexGuard<'_, HashMap<String, Session>> {
    sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock_sessions(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, server_url: &str) -> Option<Session> {
        lock_sessions(&self.sessions).get(server_url).cloned()
    }

    fn insert(&self, session: Session) {
        lock_sessions(&self.sessions).insert(session.server_url.clone(), session);
    }

    fn remove(&self, server_url: &str) -> Option<Session> {
        lock_sessions(&self.sessions).remove(server_url)
    }

    fn clear(&self) {
        lock_sessions(&self.sessions).clear();
    }
}

/// Sessions mirrored to a JSON file so separate CLI runs can reuse them.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    sessions: Mutex<HashMap<String, Session>>,
}

impl FileSessionStore {
    /// Opens the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sessions = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, Session>>(&bytes) {
                Ok(sessions) => sessions,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Ignoring corrupt session file");
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read session file");
                HashMap::new()
            }
        };
        Self {
            path,
            sessions: Mutex::new(sessions),
        }
    }

    pub fn default_path() -> std::result::Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.cache_dir().join("sessions.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, sessions: &HashMap<String, Session>) {
        let contents = match serde_json::to_vec_pretty(sessions) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(error = %err, "Failed to serialize sessions");
                return;
            }
        };
        if let Err(err) = write_atomically(&self.path, &contents) {
            warn!(path = %self.path.display(), error = %err, "Failed to persist sessions");
        }
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, server_url: &str) -> Option<Session> {
        lock_sessions(&self.sessions).get(server_url).cloned()
    }

    fn insert(&self, session: Session) {
        let mut sessions = lock_sessions(&self.sessions);
        sessions.insert(session.server_url.clone(), session);
        self.persist(&sessions);
    }

    fn remove(&self, server_url: &str) -> Option<Session> {
        let mut sessions = lock_sessions(&self.sessions);
        let removed = sessions.remove(server_url);
        if removed.is_some() {
            self.persist(&sessions);
        }
        removed
    }

    fn clear(&self) {
        let mut sessions = lock_sessions(&self.sessions);
        sessions.clear();
        self.persist(&sessions);
    }
}

#[derive(Clone)]
pub struct SessionManager {
    http: reqwest::Client,
    store: Arc<dyn SessionStore>,
    settings: Arc<ClientSettings>,
    request_ids: RequestIds,
}

impl SessionManager {
    pub(crate) fn new(
        http: reqwest::Client,
        store: Arc<dyn SessionStore>,
        settings: Arc<ClientSettings>,
        request_ids: RequestIds,
    ) -> Self {
        Self {
            http,
            store,
            settings,
            request_ids,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Returns the cached session for `server_url`, performing the
    /// `initialize` handshake first when there is none.
    pub async fn ensure_session(&self, server_url: &str, token: &str) -> Result<Session> {
        if let Some(session) = self.store.get(server_url) {
            return Ok(session);
        }

        let session = self.initialize(server_url, token).await?;
        debug!(server_url, session_id = %session.session_id, "Created MCP session");
        self.store.insert(session.clone());
        Ok(session)
    }

    /// Drops the cached session for `server_url`. Idempotent.
    pub fn invalidate(&self, server_url: &str) {
        if let Some(session) = self.store.remove(server_url) {
            debug!(server_url, session_id = %session.session_id, "Invalidated MCP session");
        }
    }

    async fn initialize(&self, server_url: &str, token: &str) -> Result<Session> {
        let request_id = self.request_ids.next();
        let request = JsonRpcRequest::new(
            request_id,
            METHOD_INITIALIZE,
            InitializeParams::new(
                &self.settings.protocol_version,
                self.settings.client_info.clone(),
            ),
        );
        debug!(request_id, url = %server_url, "Sending MCP initialize");

        let response = send_json(
            &self.http,
            Outgoing {
                url: server_url,
                token,
                session_id: None,
                protocol_version: None,
            },
            &request,
        )
        .await?;

        let session_id = session_id_from_headers(response.headers())
            .ok_or_else(|| ToolCallError::Protocol(MISSING_SESSION_ID_MESSAGE.to_string()))?;
        let result: InitializeResult = parse_response_result(decode_response(response).await?)?;

        let session = Session {
            server_url: server_url.to_string(),
            session_id,
            protocol_version: result
                .protocol_version
                .filter(|version| !version.trim().is_empty()),
        };

        if self.settings.initialized_notification {
            self.notify_initialized(&session, token).await?;
        }
        Ok(session)
    }

    async fn notify_initialized(&self, session: &Session, token: &str) -> Result<()> {
        send_json(
            &self.http,
            Outgoing {
                url: &session.server_url,
                token,
                session_id: Some(&session.session_id),
                protocol_version: Some(self.protocol_version_for(session)),
            },
            &JsonRpcNotification::initialized(),
        )
        .await?;
        Ok(())
    }

    pub(crate) fn protocol_version_for<'a>(&'a self, session: &'a Session) -> &'a str {
        session
            .protocol_version
            .as_deref()
            .unwrap_or(&self.settings.protocol_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(url: &str, id: &str) -> Session {
        Session {
            server_url: url.to_string(),
            session_id: id.to_string(),
            protocol_version: None,
        }
    }

    #[test]
    fn in_memory_store_keeps_one_session_per_url() {
        let store = InMemorySessionStore::new();
        store.insert(session("https://a", "1"));
        store.insert(session("https://a", "2"));
        store.insert(session("https://b", "3"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("https://a").map(|s| s.session_id), Some("2".into()));
        assert_eq!(store.get("https://b").map(|s| s.session_id), Some("3".into()));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = InMemorySessionStore::new();
        store.insert(session("https://a", "1"));
        assert!(store.remove("https://a").is_some());
        assert!(store.remove("https://a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("cache").join("sessions.json");

        let store = FileSessionStore::open(&path);
        store.insert(Session {
            protocol_version: Some("2024-11-05".to_string()),
            ..session("https://a", "abc")
        });
        store.insert(session("https://b", "def"));
        store.remove("https://b");

        let reopened = FileSessionStore::open(&path);
        assert_eq!(
            reopened.get("https://a"),
            Some(Session {
                protocol_version: Some("2024-11-05".to_string()),
                ..session("https://a", "abc")
            })
        );
        assert_eq!(reopened.get("https://b"), None);

        reopened.clear();
        assert_eq!(FileSessionStore::open(&path).get("https://a"), None);
    }

    #[test]
    fn file_store_ignores_corrupt_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, b"{not json").expect("write");

        let store = FileSessionStore::open(&path);
        assert_eq!(store.get("https://a"), None);
        store.insert(session("https://a", "fresh"));
        assert_eq!(
            FileSessionStore::open(&path).get("https://a").map(|s| s.session_id),
            Some("fresh".to_string())
        );
    }
}
