//! Capability provider client error types.

use thiserror::Error;

/// Errors that can occur while talking to a capability provider.
///
/// `Clone` so a single coalesced connection attempt can report the same
/// failure to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    /// The transport to a provider could not be opened.
    #[error("failed to connect to provider '{provider}': {reason}")]
    ConnectFailed {
        provider: String,
        reason: String,
    },

    /// The initialization handshake failed.
    #[error("provider '{provider}' initialization failed: {reason}")]
    InitFailed {
        provider: String,
        reason: String,
    },

    /// JSON-RPC communication error (malformed message, I/O error, bad HTTP status).
    #[error("transport error for provider '{provider}': {reason}")]
    TransportError {
        provider: String,
        reason: String,
    },

    /// Provider returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The provider answered, but the result did not have the expected shape.
    #[error("malformed {method} result from provider '{provider}': {reason}")]
    MalformedResponse {
        provider: String,
        method: String,
        reason: String,
    },

    /// No connection exists for the provider.
    #[error("provider '{provider}' is not connected")]
    NotConnected {
        provider: String,
    },

    /// A request did not complete within its budget.
    #[error("{operation} on provider '{provider}' timed out after {timeout_ms}ms")]
    Timeout {
        provider: String,
        operation: String,
        timeout_ms: u64,
    },

    /// Configuration error (bad endpoint, unknown provider id).
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl McpError {
    /// Whether the failure means the connection itself is unusable.
    ///
    /// JSON-RPC error responses and timeouts leave the channel usable;
    /// the rest mean the provider should be dropped from the table.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            McpError::ConnectFailed { .. }
                | McpError::TransportError { .. }
                | McpError::NotConnected { .. }
        )
    }
}
