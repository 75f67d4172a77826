//! Error taxonomy for tool calls.
//!
//! Every failure a caller can observe from [`crate::mcp::client::ToolClient`]
//! is one of these variants. The client performs exactly one recovery action
//! on its own (the session refresh retry for external servers); everything
//! else propagates unchanged.

use std::error::Error as StdError;
use std::fmt;

/// Upper bound on how much of a response body is quoted in parse errors.
pub const PARSE_ERROR_SNIPPET_CHARS: usize = 100;

/// Default message when a tool reports failure without any text.
pub const DEFAULT_TOOL_ERROR_MESSAGE: &str = "tool call failed";

#[derive(Debug)]
pub enum ToolCallError {
    /// No credential was available; nothing was sent over the wire.
    Auth(String),
    /// The server answered with a non-success HTTP status.
    Http { status: u16, status_text: String },
    /// The server broke the expected contract (e.g. no session id).
    Protocol(String),
    /// The response body was neither JSON nor a usable event stream.
    Parse(String),
    /// The tool ran and reported `isError: true`.
    Tool(String),
    /// The server answered with a JSON-RPC error object.
    Rpc { code: i64, message: String },
    /// The request never produced an HTTP status.
    Transport(reqwest::Error),
    /// A batch worker task ended without producing a result.
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, ToolCallError>;

impl ToolCallError {
    pub fn not_authenticated() -> Self {
        ToolCallError::Auth("not authenticated".to_string())
    }

    pub fn from_status(status: reqwest::StatusCode) -> Self {
        ToolCallError::Http {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
        }
    }

    /// Builds a parse error quoting only the head of the offending body.
    pub fn parse_with_snippet(context: &str, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        let snippet: String = text.chars().take(PARSE_ERROR_SNIPPET_CHARS).collect();
        ToolCallError::Parse(format!("{context}: {snippet}"))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ToolCallError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 400 and 401 from an external server mean the session was rejected.
    pub fn is_session_rejection(&self) -> bool {
        matches!(self.status(), Some(400 | 401))
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl fmt::Display for ToolCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCallError::Auth(message) => write!(f, "Authentication error: {message}"),
            ToolCallError::Http {
                status,
                status_text,
            } => {
                if status_text.is_empty() {
                    write!(f, "HTTP error: {status}")
                } else {
                    write!(f, "HTTP error: {status} {status_text}")
                }
            }
            ToolCallError::Protocol(message) => write!(f, "Protocol error: {message}"),
            ToolCallError::Parse(message) => write!(f, "Parse error: {message}"),
            ToolCallError::Tool(message) => write!(f, "{message}"),
            ToolCallError::Rpc { code, message } => {
                write!(f, "JSON-RPC error {code}: {message}")
            }
            ToolCallError::Transport(err) => write!(f, "Transport error: {err}"),
            ToolCallError::Aborted(message) => write!(f, "Call aborted: {message}"),
        }
    }
}

impl StdError for ToolCallError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ToolCallError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ToolCallError {
    fn from(err: reqwest::Error) -> Self {
        ToolCallError::Transport(err)
    }
}
