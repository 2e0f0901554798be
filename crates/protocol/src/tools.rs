//! MCP payload types for the methods the daemon serves.
//!
//! Field names follow the Model Context Protocol wire format (camelCase).

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// MCP protocol revision spoken when the client does not ask for one.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Name and version of a client or server implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    pub version: String,
}

/// Parameters of an `initialize` request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol revision requested by the client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client capabilities; opaque to the daemon.
    #[serde(default)]
    pub capabilities: Value,
    /// Client identification.
    #[serde(default)]
    pub client_info: Option<Implementation>,
}

/// Tool capability advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether the server emits `notifications/tools/list_changed`.
    pub list_changed: bool,
}

/// Capabilities advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Present when the server offers tools.
    pub tools: ToolsCapability,
}

/// Result of an `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol revision.
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
    /// Server identification.
    pub server_info: Implementation,
}

/// Description of a tool as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    /// Tool name, unique per server.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema of the arguments object.
    pub input_schema: Value,
}

impl ToolSpec {
    /// Create a tool taking no arguments.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: json!({
                "type": "object",
                "properties": {},
            }),
        }
    }

    /// Add a string parameter to the schema.
    pub fn with_string_param(mut self, name: &str, description: &str, required: bool) -> Self {
        if let Some(schema) = self.input_schema.as_object_mut() {
            if let Some(properties) = schema.get_mut("properties").and_then(Value::as_object_mut) {
                let mut property = Map::new();
                property.insert("type".to_string(), json!("string"));
                if !description.is_empty() {
                    property.insert("description".to_string(), json!(description));
                }
                properties.insert(name.to_string(), Value::Object(property));
            }

            if required {
                let required = schema
                    .entry("required")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Some(list) = required.as_array_mut() {
                    list.push(json!(name));
                }
            }
        }
        self
    }

    /// Names of the required parameters.
    pub fn required_params(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Result of a `tools/list` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Every tool the server offers.
    pub tools: Vec<ToolSpec>,
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool to invoke.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl CallToolParams {
    /// Create call parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    /// Add a string argument.
    pub fn with_arg(mut self, key: &str, value: impl Into<String>) -> Self {
        self.arguments
            .insert(key.to_string(), Value::String(value.into()));
        self
    }

    /// Fetch an argument as text.
    ///
    /// Numbers and booleans are rendered with their JSON spelling so that a
    /// client sending `"wait_duration": 2` is treated like one sending `"2"`.
    /// Null, arrays and objects count as absent.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.arguments.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// One block of tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}

/// Result of a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Output blocks.
    pub content: Vec<Content>,
    /// True when the tool reports a failure.
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// A successful text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// A failed text result.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Concatenated text of all blocks.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|Content::Text { text }| text.as_str())
            .collect()
    }
}
