//! Wire-level response decoding.
//!
//! A server may answer a POST either with a single `application/json`
//! document or with a `text/event-stream`; both collapse to one JSON value
//! here so the result unwrapper never sees the difference.

use serde_json::Value;

use crate::mcp::error::{Result, ToolCallError};

pub mod http;
pub mod streamable_http;

use http::content_type_of;
use streamable_http::{is_event_stream_content_type, read_event_stream};

pub async fn decode_response(response: reqwest::Response) -> Result<Value> {
    if is_event_stream_content_type(content_type_of(response.headers())) {
        return read_event_stream(response).await;
    }

    let body = response.bytes().await?;
    decode_json_body(&body)
}

pub fn decode_json_body(body: &[u8]) -> Result<Value> {
    serde_json::from_slice::<Value>(body)
        .map_err(|_| ToolCallError::parse_with_snippet("invalid JSON response", body))
}
