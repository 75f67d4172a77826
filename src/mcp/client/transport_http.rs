use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::mcp::error::{Result, ToolCallError};
use crate::mcp::transport::http::{
    apply_bearer_auth, apply_session_header, apply_streamable_http_client_post_headers,
    apply_streamable_http_protocol_version_header,
};

/// Correlation ids for outgoing envelopes. Seeded from the wall clock so ids
/// from separate processes rarely collide in server logs.
#[derive(Clone, Debug)]
pub(crate) struct RequestIds(Arc<AtomicU64>);

impl RequestIds {
    pub(crate) fn new() -> Self {
        let seed = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(1);
        Self(Arc::new(AtomicU64::new(seed)))
    }

    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Where a POST goes and what identifies the caller.
pub(crate) struct Outgoing<'a> {
    pub url: &'a str,
    pub token: &'a str,
    pub session_id: Option<&'a str>,
    pub protocol_version: Option<&'a str>,
}

/// POSTs `body` as JSON. Any non-2xx status becomes [`ToolCallError::Http`]
/// before the body is read.
pub(crate) async fn send_json<B: Serialize + ?Sized>(
    http: &reqwest::Client,
    target: Outgoing<'_>,
    body: &B,
) -> Result<reqwest::Response> {
    let mut request = apply_streamable_http_client_post_headers(http.post(target.url));
    request = apply_bearer_auth(request, target.token);
    request = apply_session_header(request, target.session_id);
    request = apply_streamable_http_protocol_version_header(request, target.protocol_version);

    let response = request.json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ToolCallError::from_status(status));
    }
    Ok(response)
}
