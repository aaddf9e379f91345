//! Shared types for the capability provider client.
//!
//! JSON-RPC 2.0 message types and MCP protocol structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// MCP protocol revision sent in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// Tool definition as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// `tools/list` result payload.
///
/// Entries stay raw so one malformed definition can be skipped without
/// losing the rest of the page.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<serde_json::Value>,
    #[serde(default, alias = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// `initialize` result payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(default, alias = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default, alias = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

// ─── Provider Configuration ──────────────────────────────────────────────────

/// One remote capability provider, from the `providers` config section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderConfig {
    /// Short identifier; becomes the tool-name prefix (`{id}_{tool}`).
    pub id: String,
    /// HTTP endpoint speaking JSON-RPC (e.g. `http://localhost:8931/mcp`).
    pub endpoint: String,
    /// Extra headers sent on every request (auth tokens etc.).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(id: &str, endpoint: &str) -> Self {
        Self {
            id: id.to_string(),
            endpoint: endpoint.to_string(),
            headers: HashMap::new(),
        }
    }
}

/// Code used when a provider answers with neither `result` nor `error`.
pub const INTERNAL_ERROR: i32 = -32603;

// ─── Tests ───────────────────────────────────────────────────────────────────
