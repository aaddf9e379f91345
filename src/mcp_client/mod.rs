//! MCP Client: JSON-RPC over HTTP for remote capability providers.
//!
//! This module handles:
//! - JSON-RPC 2.0 communication with providers (plain JSON or SSE replies)
//! - The initialization handshake and session continuity
//! - Paged tool discovery and timed tool calls
//! - The provider connection table: lazy bootstrap, in-flight connect
//!   coalescing, disconnect on transport failure, reconnect and reset
//!
//! Discovered tools are wrapped as local descriptors by `crate::tools`.

pub mod connection;
pub mod discovery;
pub mod errors;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use connection::{ProviderConnection, ProviderTimeouts};
pub use discovery::CapabilityDiscovery;
pub use errors::McpError;
pub use transport::{HttpConnector, HttpTransport, ProviderTransport, TransportConnector};
pub use types::{McpToolDefinition, ProviderConfig};
