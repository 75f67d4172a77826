//! Toolwire is a client for calling named tools over JSON-RPC.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`mcp`] owns the protocol: request framing, JSON and event-stream
//!   response decoding, result unwrapping, external sessions and the
//!   [`mcp::ToolClient`] call paths (local, external, batch).
//! - [`core`] holds configuration loading and the credential sources the
//!   client asks for bearer tokens.
//! - [`utils`] carries URL joining and logging setup.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], a thin
//! command-line wrapper over the client.

pub mod cli;
pub mod core;
pub mod mcp;
pub mod utils;
