use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::protocol::{parse_response_result, unwrap_call_result, ContentValue};
use super::transport_http::{send_json, Outgoing};
use super::ToolClient;
use crate::mcp::error::{Result, ToolCallError};
use crate::mcp::transport::decode_response;
use crate::mcp::types::{
    CallToolParams, JsonRpcRequest, ListToolsParams, ListToolsResult, ToolCallRequest,
    ToolDescriptor, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
};

/// Re-handshakes allowed per external call after the server rejects a session.
pub const MAX_SESSION_RETRIES: usize = 1;

const MAX_TOOL_LIST_PAGES: usize = 100;

impl ToolClient {
    /// Calls a tool on the co-located server. No session, no retry.
    pub async fn call(&self, method: &str, arguments: Map<String, Value>) -> Result<ContentValue> {
        let token = self.require_token().await?;
        let url = self.settings.local_endpoint(method);
        let request_id = self.request_ids.next();
        let request = JsonRpcRequest::new(
            request_id,
            METHOD_TOOLS_CALL,
            CallToolParams {
                name: method,
                arguments: &arguments,
            },
        );
        debug!(request_id, method, url = %url, "Sending local tool call");

        let target = Outgoing {
            url: &url,
            token: &token,
            session_id: None,
            protocol_version: None,
        };
        let response = match send_json(&self.http, target, &request).await {
            Ok(response) => response,
            Err(err) => return Err(self.report_failure(err).await),
        };
        unwrap_call_result(decode_response(response).await?)
    }

    pub async fn call_request(&self, request: &ToolCallRequest) -> Result<ContentValue> {
        self.call(&request.method, request.arguments.clone()).await
    }

    /// Calls a tool on a third-party server through its negotiated session.
    pub async fn call_external(
        &self,
        server_url: &str,
        method: &str,
        arguments: Map<String, Value>,
    ) -> Result<ContentValue> {
        let value = self
            .post_external(server_url, method, |id| {
                JsonRpcRequest::new(
                    id,
                    METHOD_TOOLS_CALL,
                    CallToolParams {
                        name: method,
                        arguments: &arguments,
                    },
                )
            })
            .await?;
        unwrap_call_result(value)
    }

    /// Lists every tool a third-party server advertises, following cursors.
    pub async fn list_tools_external(&self, server_url: &str) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_LIST_PAGES {
            let value = self
                .post_external(server_url, METHOD_TOOLS_LIST, |id| {
                    JsonRpcRequest::new(
                        id,
                        METHOD_TOOLS_LIST,
                        ListToolsParams {
                            cursor: cursor.clone(),
                        },
                    )
                })
                .await?;
            let page: ListToolsResult = parse_response_result(value)?;
            tools.extend(page.tools);

            match page.next_cursor.filter(|next| !next.is_empty()) {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        warn!(server_url, "Stopped listing tools after page limit");
        Ok(tools)
    }

    /// Runs every call concurrently on the local path. Results follow input
    /// order; the first failure to complete becomes the batch's error.
    /// Calls still in flight at that point keep running detached.
    pub async fn batch(&self, calls: Vec<ToolCallRequest>) -> Result<Vec<ContentValue>> {
        let total = calls.len();
        let mut pending: FuturesUnordered<_> = calls
            .into_iter()
            .enumerate()
            .map(|(index, request)| {
                let client = self.clone();
                let handle =
                    tokio::spawn(async move { client.call_request(&request).await });
                async move { (index, handle.await) }
            })
            .collect();

        let mut results: Vec<Option<ContentValue>> = vec![None; total];
        while let Some((index, joined)) = pending.next().await {
            let value = joined.map_err(|err| ToolCallError::Aborted(err.to_string()))??;
            results[index] = Some(value);
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Forgets the session for `server_url`; the next external call handshakes.
    pub fn invalidate_session(&self, server_url: &str) {
        self.sessions.invalidate(server_url);
    }

    async fn post_external<B, F>(&self, server_url: &str, label: &str, build: F) -> Result<Value>
    where
        B: Serialize,
        F: Fn(u64) -> B,
    {
        let token = self.require_token().await?;
        let mut attempt = 0;

        loop {
            let session = match self.sessions.ensure_session(server_url, &token).await {
                Ok(session) => session,
                Err(err) => return Err(self.report_failure(err).await),
            };
            let request_id = self.request_ids.next();
            let body = build(request_id);
            debug!(
                request_id,
                method = label,
                url = %server_url,
                attempt,
                "Sending external request"
            );

            let target = Outgoing {
                url: server_url,
                token: &token,
                session_id: Some(&session.session_id),
                protocol_version: Some(self.sessions.protocol_version_for(&session)),
            };
            match send_json(&self.http, target, &body).await {
                Ok(response) => return decode_response(response).await,
                Err(err) if err.is_session_rejection() => {
                    self.sessions.invalidate(server_url);
                    if attempt >= MAX_SESSION_RETRIES {
                        return Err(self.report_failure(err).await);
                    }
                    attempt += 1;
                    warn!(server_url, error = %err, "Session rejected; re-initializing");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
