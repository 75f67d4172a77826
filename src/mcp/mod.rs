//! Model Context Protocol tool-call client.
//!
//! [`client::ToolClient`] is the entry point. [`transport`] owns framing and
//! response decoding, [`types`] the JSON-RPC envelope, and [`error`] the
//! failure taxonomy every call reports through.

pub mod client;
pub mod error;
pub mod transport;
pub mod types;

pub use client::{ContentValue, ToolClient};
pub use error::ToolCallError;
pub use types::ToolCallRequest;

/// Protocol revision sent in `initialize` unless configured otherwise.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
