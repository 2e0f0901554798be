//! # termhub Protocol Library
//!
//! Wire types shared by the termhub daemon and its clients.
//!
//! ## Overview
//!
//! termhub speaks the Model Context Protocol: JSON-RPC 2.0 messages, one per
//! line, over stdio or a Unix domain socket. This crate provides:
//!
//! - **Envelopes**: JSON-RPC requests, notifications, responses and error codes
//! - **Tool Types**: `initialize`, `tools/list` and `tools/call` payloads
//! - **Line Codec**: newline-delimited JSON encoding with a line length limit
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        MCP payloads (tools/*)           │  tools.rs
//! ├─────────────────────────────────────────┤
//! │        JSON-RPC 2.0 envelopes           │  messages.rs
//! ├─────────────────────────────────────────┤
//! │        Newline-delimited JSON           │  framing.rs
//! ├─────────────────────────────────────────┤
//! │        Transport (stdio / UDS)          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use termhub_protocol::{CallToolParams, LineCodec, Request, RequestId};
//!
//! let params = CallToolParams::new("start_session").with_arg("host", "local");
//! let request = Request::new(
//!     RequestId::Number(1),
//!     "tools/call",
//!     Some(serde_json::to_value(&params).unwrap()),
//! );
//!
//! let line = LineCodec::new().encode(&request).unwrap();
//! assert!(line.ends_with('\n'));
//! ```

pub mod error;
pub mod framing;
pub mod messages;
pub mod tools;

pub use error::{ProtocolError, Result};
pub use framing::{LineCodec, MAX_LINE_LENGTH};
pub use messages::{error_codes, Request, RequestId, Response, RpcError, JSONRPC_VERSION};
pub use tools::{
    CallToolParams, CallToolResult, Content, Implementation, InitializeParams, InitializeResult,
    ListToolsResult, ServerCapabilities, ToolSpec, ToolsCapability, MCP_PROTOCOL_VERSION,
};
