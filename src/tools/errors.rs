//! Tool-layer errors and the structured payloads they turn into.
//!
//! None of these fail a run: the execution node converts each into a
//! tool-result message so the model can react.

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    /// Arguments rejected by the tool's schema before execution.
    #[error("invalid arguments for '{tool}': {reason}")]
    Validation { tool: String, reason: String },

    /// The requested tool is not in the current tool set.
    #[error("tool not found: {name}")]
    NotFound { name: String },

    /// The tool did not finish within its budget.
    #[error("tool '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
}

impl ToolError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Validation { .. } => "validation_error",
            ToolError::NotFound { .. } => "tool_not_found",
            ToolError::Timeout { .. } => "tool_timeout",
        }
    }

    /// The tool-result payload the model sees.
    pub fn to_payload(&self) -> Value {
        let tool = match self {
            ToolError::Validation { tool, .. } | ToolError::Timeout { tool, .. } => tool,
            ToolError::NotFound { name } => name,
        };
        error_payload(self.kind(), tool, &self.to_string())
    }
}

/// `{"status":"error","error":kind,"tool":..,"message":..}`
pub fn error_payload(kind: &str, tool: &str, message: &str) -> Value {
    json!({
        "status": "error",
        "error": kind,
        "tool": tool,
        "message": message,
    })
}
