//! Request router for dispatching JSON-RPC methods to the session tools.
//!
//! This module provides the `McpRouter` struct that receives decoded
//! requests and answers them: the MCP handshake, `tools/list` and
//! `tools/call`. Tool failures are reported inside a successful result with
//! `isError` set; protocol failures become JSON-RPC error responses.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use termhub_protocol::{
    error_codes, CallToolParams, CallToolResult, Implementation, InitializeParams,
    InitializeResult, ListToolsResult, Request, RequestId, Response, RpcError,
    ServerCapabilities, ToolsCapability, MCP_PROTOCOL_VERSION,
};

use crate::handlers::SessionTools;

/// Server name reported during `initialize`.
pub const SERVER_NAME: &str = "termhub";

/// Result type for router operations.
pub type RouterResult = Result<Value, RouterError>;

/// Errors that can occur while routing a request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// No such JSON-RPC method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Parameters missing or of the wrong shape.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// `tools/call` named a tool that does not exist.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Convert the error to a JSON-RPC error object.
    pub fn to_rpc_error(&self) -> RpcError {
        let code = match self {
            RouterError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            RouterError::InvalidParams(_) | RouterError::UnknownTool(_) => {
                error_codes::INVALID_PARAMS
            }
            RouterError::Internal(_) => error_codes::INTERNAL_ERROR,
        };
        RpcError::new(code, self.to_string())
    }
}

/// Dispatches requests to the session tools.
pub struct McpRouter {
    tools: SessionTools,
    server_info: Implementation,
}

impl McpRouter {
    /// Create a router over the given tools.
    pub fn new(tools: SessionTools) -> Self {
        Self {
            tools,
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Handle one decoded JSON message.
    ///
    /// Returns `None` for notifications.
    pub async fn handle_value(&self, value: Value) -> Option<Response> {
        // Keep the id around so even a malformed request gets a matching reply.
        let id = value
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<RequestId>(id).ok());

        match Request::from_value(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!(error = %e, "Invalid request");
                Some(Response::error(id, RpcError::from(&e)))
            }
        }
    }

    /// Handle a decoded request.
    ///
    /// Notifications are acknowledged in the log only and never answered.
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "Received notification");
            return None;
        };

        debug!(id = %id, method = %request.method, "Routing request");

        let result = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "ping" => Ok(Value::Object(Default::default())),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(request.params).await,
            other => Err(RouterError::MethodNotFound(other.to_string())),
        };

        Some(match result {
            Ok(value) => Response::success(Some(id), value),
            Err(e) => {
                debug!(error = %e, "Request failed");
                Response::error(Some(id), e.to_rpc_error())
            }
        })
    }

    fn initialize(&self, params: Option<Value>) -> RouterResult {
        let params: InitializeParams = match params {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| RouterError::InvalidParams(e.to_string()))?,
            None => InitializeParams::default(),
        };

        if let Some(client) = &params.client_info {
            tracing::info!(client = %client.name, version = %client.version, "Client connected");
        }

        let protocol_version = params
            .protocol_version
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| MCP_PROTOCOL_VERSION.to_string());

        to_value(&InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: ToolsCapability::default(),
            },
            server_info: self.server_info.clone(),
        })
    }

    fn list_tools(&self) -> RouterResult {
        to_value(&ListToolsResult {
            tools: SessionTools::specs(),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> RouterResult {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| RouterError::InvalidParams(e.to_string()))?;

        let output = self
            .tools
            .call(&params)
            .await
            .ok_or_else(|| RouterError::UnknownTool(params.name.clone()))?;

        if output.is_error {
            debug!(tool = %params.name, message = %output.text, "Tool reported an error");
        }

        to_value(&CallToolResult::from(output))
    }
}

fn to_value<T: Serialize>(value: &T) -> RouterResult {
    serde_json::to_value(value).map_err(|e| RouterError::Internal(e.to_string()))
}
