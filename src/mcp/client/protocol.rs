use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::mcp::error::{Result, ToolCallError, DEFAULT_TOOL_ERROR_MESSAGE};
use crate::mcp::types::{CallToolResult, ContentItem, JsonRpcResponse};

/// A decoded content item: JSON when its text parsed, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentValue {
    Json(Value),
    Text(String),
}

impl ContentValue {
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => ContentValue::Json(value),
            Err(_) => ContentValue::Text(text.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ContentValue::Json(value) => Some(value),
            ContentValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentValue::Text(text) => Some(text),
            ContentValue::Json(_) => None,
        }
    }

    /// Text becomes a JSON string so the result can be embedded anywhere a
    /// `Value` is expected.
    pub fn into_value(self) -> Value {
        match self {
            ContentValue::Json(value) => value,
            ContentValue::Text(text) => Value::String(text),
        }
    }

    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.into_value())
            .map_err(|err| ToolCallError::Parse(format!("unexpected tool result shape: {err}")))
    }
}

fn decode_item(item: &ContentItem) -> ContentValue {
    match item.text.as_deref() {
        Some(text) => ContentValue::from_text(text),
        None => ContentValue::Json(Value::Null),
    }
}

pub fn decode_content(content: &[ContentItem]) -> Vec<ContentValue> {
    content.iter().map(decode_item).collect()
}

/// Deserializes a decoded body into an envelope and pulls out `result`,
/// surfacing a JSON-RPC `error` object when the server sent one instead.
pub(crate) fn parse_response_result<R: DeserializeOwned>(value: Value) -> Result<R> {
    let envelope: JsonRpcResponse<R> = serde_json::from_value(value)
        .map_err(|err| ToolCallError::Parse(format!("malformed JSON-RPC envelope: {err}")))?;

    if let Some(error) = envelope.error {
        return Err(ToolCallError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    envelope
        .result
        .ok_or_else(|| ToolCallError::Parse("response envelope has no result".to_string()))
}

fn check_tool_error(result: &CallToolResult) -> Result<()> {
    if !result.is_error {
        return Ok(());
    }
    let message = result
        .content
        .first()
        .and_then(|item| item.text.clone())
        .unwrap_or_else(|| DEFAULT_TOOL_ERROR_MESSAGE.to_string());
    Err(ToolCallError::Tool(message))
}

/// Every content item of a successful call, in server order.
pub fn unwrap_all(value: Value) -> Result<Vec<ContentValue>> {
    let result: CallToolResult = parse_response_result(value)?;
    check_tool_error(&result)?;
    Ok(decode_content(&result.content))
}

/// The call's resolved value: the first content item only. Additional parts
/// are dropped; use [`unwrap_all`] when every part matters. An empty
/// `content` resolves to JSON `null`.
pub fn unwrap_call_result(value: Value) -> Result<ContentValue> {
    Ok(unwrap_all(value)?
        .into_iter()
        .next()
        .unwrap_or(ContentValue::Json(Value::Null)))
}
